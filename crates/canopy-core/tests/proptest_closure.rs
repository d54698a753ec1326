use canopy_core::StoreError;
use canopy_core::db::content::ContentFilter;
use canopy_core::db::query::{Direction, RelationOptions, related_by};
use canopy_core::graph::hierarchy::{
    AncestorOptions, DescendantOptions, SiblingOptions, ancestors_of, children_of,
    descendants_of, refresh_ancestors, siblings_of, subtree_ids,
};
use canopy_core::model::entity::NewEntity;
use canopy_core::model::relation::NewRelation;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::{BTreeMap, BTreeSet};

use generators::*;

fn ancestors_with_depth(store: &canopy_core::EntityStore, id: &str) -> Vec<(String, i64)> {
    ancestors_of(
        store.conn(),
        id,
        &AncestorOptions {
            include_relation_meta: true,
            order: Some(Direction::Asc),
            ..AncestorOptions::default()
        },
    )
    .expect("ancestors")
    .into_iter()
    .map(|row| (row.entity.id.clone(), row.depth().expect("depth")))
    .collect()
}

/// Check every entity's ancestor rows against the parent vector.
fn assert_closure(store: &canopy_core::EntityStore, parents: &[Option<usize>]) {
    for i in 0..parents.len() {
        let expected: Vec<(String, i64)> = chain(parents, i)
            .into_iter()
            .zip(1_i64..)
            .map(|(p, depth)| (node_id(p), depth))
            .collect();
        assert_eq!(ancestors_with_depth(store, &node_id(i)), expected, "node {i}");
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn closure_composes_from_parent(parents in arb_forest(12)) {
        let store = build_store(&parents);
        for (i, parent) in parents.iter().enumerate() {
            let Some(p) = parent else { continue };
            let own = ancestors_with_depth(&store, &node_id(i));
            let mut expected = vec![(node_id(*p), 1)];
            expected.extend(
                ancestors_with_depth(&store, &node_id(*p))
                    .into_iter()
                    .map(|(id, depth)| (id, depth + 1)),
            );
            prop_assert_eq!(own, expected);
        }
    }

    #[test]
    fn random_moves_keep_closure_exact(
        parents in arb_forest(10),
        moves in proptest::collection::vec((any::<Index>(), proptest::option::of(any::<Index>())), 0..8),
    ) {
        let store = build_store(&parents);
        let mut parents = parents;
        let n = parents.len();

        for (who, target) in moves {
            let who = who.index(n);
            let target = target.map(|t| t.index(n));
            let result = store.move_entity(&node_id(who), target.map(node_id).as_deref());
            match target {
                Some(t) if in_subtree(&parents, who, t) => {
                    let is_cycle = matches!(result, Err(StoreError::CycleDetected { .. }));
                    prop_assert!(is_cycle, "move {who} -> {t} should be a cycle: {result:?}");
                }
                _ => {
                    prop_assert!(result.is_ok(), "move {who} -> {target:?}: {result:?}");
                    parents[who] = target;
                }
            }
        }

        assert_closure(&store, &parents);
    }

    #[test]
    fn refresh_is_idempotent(parents in arb_forest(12), pick in any::<Index>()) {
        let store = build_store(&parents);
        let target = node_id(pick.index(parents.len()));
        let before = ancestor_edges(&store);

        refresh_ancestors(store.conn(), &target).expect("first refresh");
        let once = ancestor_edges(&store);
        refresh_ancestors(store.conn(), &target).expect("second refresh");
        let twice = ancestor_edges(&store);

        prop_assert_eq!(&before, &once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn descendant_depth_limits_nest(parents in arb_forest(12), pick in any::<Index>()) {
        let store = build_store(&parents);
        let root = node_id(pick.index(parents.len()));
        let at = |max_depth| -> BTreeSet<String> {
            descendants_of(
                store.conn(),
                &root,
                &DescendantOptions { max_depth, ..DescendantOptions::default() },
            )
            .expect("descendants")
            .into_iter()
            .map(|row| row.entity.id)
            .collect()
        };
        let one = at(1);
        let two = at(2);
        let all = at(99);
        prop_assert!(one.is_subset(&two));
        prop_assert!(two.is_subset(&all));

        let with_meta = descendants_of(
            store.conn(),
            &root,
            &DescendantOptions { include_relation_meta: true, ..DescendantOptions::default() },
        )
        .expect("descendants");
        let depths: Vec<i64> = with_meta.iter().map(|row| row.depth().expect("depth")).collect();
        prop_assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn children_are_depth_one_descendants(parents in arb_forest(12), pick in any::<Index>()) {
        let store = build_store(&parents);
        let root = node_id(pick.index(parents.len()));
        let children: Vec<String> = children_of(store.conn(), &root, None)
            .expect("children")
            .into_iter()
            .map(|row| row.entity.id)
            .collect();
        let depth_one: Vec<String> = descendants_of(
            store.conn(),
            &root,
            &DescendantOptions { max_depth: 1, ..DescendantOptions::default() },
        )
        .expect("descendants")
        .into_iter()
        .map(|row| row.entity.id)
        .collect();
        prop_assert_eq!(children, depth_one);
    }

    #[test]
    fn siblings_exclude_self(parents in arb_forest(12), pick in any::<Index>()) {
        let store = build_store(&parents);
        let i = pick.index(parents.len());
        let id = node_id(i);
        let siblings = siblings_of(store.conn(), &id, &SiblingOptions::default()).expect("siblings");

        prop_assert!(siblings.iter().all(|row| row.entity.id != id));
        match parents[i] {
            None => prop_assert!(siblings.is_empty()),
            Some(p) => {
                let expected = parents
                    .iter()
                    .enumerate()
                    .filter(|(j, parent)| *j != i && **parent == Some(p))
                    .count();
                prop_assert_eq!(siblings.len(), expected);
            }
        }
    }

    #[test]
    fn subtree_is_descendants_plus_self(parents in arb_forest(12), pick in any::<Index>()) {
        let store = build_store(&parents);
        let root = node_id(pick.index(parents.len()));
        let subtree: BTreeSet<String> =
            subtree_ids(store.conn(), &root).expect("subtree").into_iter().collect();
        let mut expected: BTreeSet<String> =
            descendants_of(store.conn(), &root, &DescendantOptions::default())
                .expect("descendants")
                .into_iter()
                .map(|row| row.entity.id)
                .collect();
        expected.insert(root);
        prop_assert_eq!(subtree, expected);
    }

    #[test]
    fn exclusion_dominates_inclusion(kinds in proptest::collection::vec(prop_oneof!["a", "b", "c"], 1..6)) {
        let store = store();
        store.create(NewEntity::new().with_id("src")).expect("src");
        for (i, kind) in kinds.iter().enumerate() {
            let target = format!("t{i}");
            store.create(NewEntity::new().with_id(&target)).expect("target");
            store.relate(&NewRelation::new("src", &target).kind(kind)).expect("relate");
        }

        let ids = |options: &RelationOptions| -> Vec<String> {
            related_by(store.conn(), "src", options)
                .expect("related")
                .into_iter()
                .map(|row| row.entity.id)
                .collect()
        };
        let overlap = ids(&RelationOptions::new().kinds(["a", "b"]).except_kind("b"));
        let only_a = ids(&RelationOptions::new().kind("a"));
        prop_assert_eq!(overlap, only_a);
    }

    #[test]
    fn last_upsert_wins(writes in proptest::collection::vec(("[a-c]", "[a-z]{0,6}"), 1..10)) {
        let store = store();
        store.create(NewEntity::new().with_id("e")).expect("create");
        let mut expected = BTreeMap::new();
        for (field, text) in &writes {
            store.upsert_contents("e", [(field, text)], None).expect("upsert");
            expected.insert(field.clone(), text.clone());
        }
        let contents = store.contents("e", &ContentFilter::default()).expect("contents");
        prop_assert_eq!(contents.len(), expected.len());
        prop_assert_eq!(contents.flatten_by_field(), expected);
    }
}
