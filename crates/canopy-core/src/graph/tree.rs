//! Nest a flat entity list into parent/child nodes.

use serde::Serialize;
use std::collections::HashMap;

use crate::model::entity::Entity;

/// An entity with its nested children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub entity: Entity,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// Build a forest from `entities`.
///
/// An entity whose parent is not in the list becomes a root. Roots and
/// siblings keep their input order. Entities caught in a parent loop with no
/// way back to a root are left out.
#[must_use]
pub fn build_tree<I>(entities: I) -> Vec<TreeNode>
where
    I: IntoIterator<Item = Entity>,
{
    let entities: Vec<Entity> = entities.into_iter().collect();
    let index: HashMap<&str, usize> = entities
        .iter()
        .enumerate()
        .map(|(idx, entity)| (entity.id.as_str(), idx))
        .collect();

    let mut roots: Vec<usize> = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
    for (idx, entity) in entities.iter().enumerate() {
        match entity
            .parent_entity_id
            .as_deref()
            .and_then(|parent| index.get(parent))
        {
            Some(&parent) if parent != idx => children[parent].push(idx),
            _ => roots.push(idx),
        }
    }

    // Breadth-first visiting order; building in reverse guarantees every
    // child node exists before its parent is assembled.
    let mut order: Vec<usize> = roots.clone();
    let mut cursor = 0;
    while cursor < order.len() {
        order.extend(children[order[cursor]].iter().copied());
        cursor += 1;
    }

    let mut slots: Vec<Option<Entity>> = entities.into_iter().map(Some).collect();
    let mut built: HashMap<usize, TreeNode> = HashMap::with_capacity(order.len());
    for &idx in order.iter().rev() {
        let Some(entity) = slots[idx].take() else {
            continue;
        };
        let nested = children[idx]
            .iter()
            .filter_map(|child| built.remove(child))
            .collect();
        built.insert(
            idx,
            TreeNode {
                entity,
                children: nested,
            },
        );
    }

    roots.iter().filter_map(|root| built.remove(root)).collect()
}
