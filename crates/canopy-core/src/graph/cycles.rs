//! Cycle detection over `parent_entity_id` pointers.
//!
//! The closure rebuild walks parent pointers upward, so a loop in those
//! pointers would never terminate. Moves are checked here before any write,
//! and every walk keeps a visited set so a corrupt store fails loudly instead
//! of spinning.

#![allow(clippy::module_name_repetitions)]

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// A loop in the parent chain, listed from the starting entity back to it.
///
/// Setting `a`'s parent to `c` in `a <- b <- c` yields `["a", "c", "b", "a"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCycle {
    pub path: Vec<String>,
}

impl ParentCycle {
    /// Number of distinct entities in the loop.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for ParentCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join(" -> "))
    }
}

/// Parent pointer of `id`: `None` when the entity does not exist,
/// `Some(None)` for roots.
pub(crate) fn parent_pointer(conn: &Connection, id: &str) -> StoreResult<Option<Option<String>>> {
    Ok(conn
        .query_row(
            "SELECT parent_entity_id FROM entities WHERE id = ?1",
            params![id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?)
}

/// Walk up from `start` and return its parent chain, nearest first.
///
/// # Errors
///
/// Returns [`StoreError::EntityNotFound`] if `start` or a referenced parent
/// is missing, and [`StoreError::CycleDetected`] if the walk revisits an
/// entity.
pub fn parent_chain(conn: &Connection, start: &str) -> StoreResult<Vec<String>> {
    let mut current = parent_pointer(conn, start)?.ok_or_else(|| StoreError::not_found(start))?;
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut chain = Vec::new();

    while let Some(parent) = current {
        if !visited.insert(parent.clone()) {
            return Err(StoreError::CycleDetected {
                entity_id: start.to_string(),
                parent_id: parent,
            });
        }
        current = parent_pointer(conn, &parent)?.ok_or_else(|| StoreError::not_found(&parent))?;
        chain.push(parent);
    }

    Ok(chain)
}

/// Check whether making `proposed_parent` the parent of `entity_id` closes a
/// loop. Returns the loop if it would.
///
/// # Errors
///
/// Returns an error if a lookup fails or the existing chain above
/// `proposed_parent` is already cyclic.
pub fn would_create_cycle(
    conn: &Connection,
    entity_id: &str,
    proposed_parent: &str,
) -> StoreResult<Option<ParentCycle>> {
    if entity_id == proposed_parent {
        return Ok(Some(ParentCycle {
            path: vec![entity_id.to_string(), entity_id.to_string()],
        }));
    }

    let mut path = vec![entity_id.to_string(), proposed_parent.to_string()];
    for ancestor in parent_chain(conn, proposed_parent)? {
        let closes = ancestor == entity_id;
        path.push(ancestor);
        if closes {
            return Ok(Some(ParentCycle { path }));
        }
    }
    Ok(None)
}
