//! Entity lifecycle against an on-disk store: ids, defaults, relations,
//! contents, deletes and version counters.

use canopy_core::config::{self, StoreConfig};
use canopy_core::db::content::ContentFilter;
use canopy_core::db::query::{ContentOp, Direction, EntityFilter, RelationOptions, related_by, relating};
use canopy_core::events::EventKind;
use canopy_core::model::entity::{Entity, NewEntity};
use canopy_core::model::relation::{NewRelation, RelationPatch};
use canopy_core::model::status::Status;
use canopy_core::{EntityStore, ErrorCode, StoreError};
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use generators::store;

fn on_disk() -> (TempDir, EntityStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join(config::STATE_DIR)).expect("state dir");
    let store = EntityStore::open(dir.path()).expect("open store");
    (dir, store)
}

#[test]
fn store_survives_reopen() {
    let (dir, store) = on_disk();
    store.create(NewEntity::new().with_id("home")).expect("create");
    store
        .create(NewEntity::new().with_id("about").child_of("home"))
        .expect("create child");
    drop(store);

    let reopened = EntityStore::open(dir.path()).expect("reopen");
    let about = reopened.find("about").expect("about");
    assert_eq!(about.parent_entity_id.as_deref(), Some("home"));
}

#[test]
fn generated_ids_follow_config_length() {
    let config = StoreConfig {
        short_id_length: 6,
        ..StoreConfig::default()
    };
    let store = EntityStore::in_memory(config).expect("store");
    let entity = store.create(NewEntity::new()).expect("create");
    assert_eq!(entity.id.chars().count(), 6);
}

#[test]
fn colliding_generator_exhausts() {
    let store = store().with_id_generator(|_: usize| "fixed".to_string());
    store.create(NewEntity::new()).expect("first uses the id");
    let err = store.create(NewEntity::new()).expect_err("second collides");
    assert!(matches!(err, StoreError::GenerationExhausted { attempts: 5 }));
    assert_eq!(err.code(), ErrorCode::GenerationExhausted);
}

#[test]
fn explicit_values_beat_defaults() {
    let store = store();
    let entity = store
        .create(
            NewEntity::new()
                .with_id("post")
                .model("BlogPost")
                .publish_at(None)
                .props(serde_json::json!({ "color": "red" })),
        )
        .expect("create");
    assert_eq!(entity.model, "BlogPost");
    assert_eq!(entity.view.as_deref(), Some("blog_post"));
    assert_eq!(entity.publish_at, None);
    assert_eq!(entity.status(), Status::Draft);
    assert_eq!(entity.prop("color"), Some(&serde_json::json!("red")));
}

#[test]
fn status_follows_publication_window() {
    let store = store();
    let now = Utc::now();
    let scheduled = store
        .create(NewEntity::new().scheduled(now + Duration::days(1)))
        .expect("scheduled");
    let expired = store
        .create(NewEntity::new().expired(now - Duration::days(10), now - Duration::days(1)))
        .expect("expired");
    let live = store.create(NewEntity::new()).expect("live");
    let bounded = store
        .create(NewEntity::new().live(now - Duration::days(1), Some(now + Duration::days(1))))
        .expect("bounded");

    assert_eq!(scheduled.status_at(now), Status::Scheduled);
    assert_eq!(expired.status_at(now), Status::Expired);
    assert_eq!(live.status_at(now + Duration::seconds(1)), Status::Live);
    assert_eq!(bounded.status_at(now), Status::Live);
    assert_eq!(bounded.status_at(now + Duration::days(2)), Status::Expired);

    let listed = store
        .list(&EntityFilter::new().currently_live(now + Duration::seconds(1)))
        .expect("list");
    let mut ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
    ids.sort_unstable();
    let mut expected = vec![live.id.as_str(), bounded.id.as_str()];
    expected.sort_unstable();
    assert_eq!(ids, expected);
}

#[test]
fn delete_and_restore_emit_events() {
    let mut store = store();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(move |kind: EventKind, entity: &Entity| {
        sink.lock()
            .expect("lock")
            .push((kind, entity.is_trashed()));
    });

    store.create(NewEntity::new().with_id("x")).expect("create");
    seen.lock().expect("lock").clear();

    store.delete("x").expect("delete");
    store.restore("x").expect("restore");
    store.restore("x").expect("restore again is a no-op");

    assert_eq!(
        *seen.lock().expect("lock"),
        vec![
            (EventKind::Deleting, false),
            (EventKind::Deleted, true),
            (EventKind::Restoring, true),
            (EventKind::Restored, false),
        ]
    );
}

#[test]
fn relations_guard_hard_deletes() {
    let store = store();
    store.create(NewEntity::new().with_id("page")).expect("page");
    store.create(NewEntity::new().with_id("img")).expect("img");
    let relation = store
        .relate(&NewRelation::new("page", "img").kind("medium").tags(["hero"]))
        .expect("relate");

    let page = store.find("page").expect("page");
    assert_eq!(page.version_relations, 2);
    assert_eq!(page.version_full, 2);

    let err = store.force_delete("img").expect_err("restricted");
    assert!(matches!(err, StoreError::ConstraintViolation { .. }));
    assert!(store.find("img").is_ok());

    store.unrelate(relation.relation_id).expect("unrelate");
    store.force_delete("img").expect("now allowed");
    assert!(matches!(
        store.find_with_trashed("img"),
        Err(StoreError::EntityNotFound { .. })
    ));
}

#[test]
fn relation_queries_filter_and_order() {
    let store = store();
    for id in ["page", "a", "b", "c"] {
        store.create(NewEntity::new().with_id(id)).expect("create");
    }
    store
        .relate(&NewRelation::new("page", "a").kind("medium").position(2))
        .expect("a");
    store
        .relate(&NewRelation::new("page", "b").kind("medium").position(1).tags(["hero"]))
        .expect("b");
    let link = store
        .relate(&NewRelation::new("page", "c").kind("link"))
        .expect("c");

    let rows = related_by(store.conn(), "page", &RelationOptions::new().kind("medium"))
        .expect("related");
    let ids: Vec<_> = rows.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["b", "a"]);

    let rows = related_by(
        store.conn(),
        "page",
        &RelationOptions::new()
            .kinds(["medium", "link"])
            .except_kind("medium")
            .with_meta(),
    )
    .expect("related");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].relation.as_ref().map(|m| m.relation_id), Some(link.relation_id));

    let rows = related_by(store.conn(), "page", &RelationOptions::new().tagged("hero"))
        .expect("tagged");
    assert_eq!(rows.iter().map(|r| r.id()).collect::<Vec<_>>(), vec!["b"]);

    let rows = related_by(
        store.conn(),
        "page",
        &RelationOptions::new().kind("medium").order_str("position desc"),
    )
    .expect("ordered");
    assert_eq!(rows.iter().map(|r| r.id()).collect::<Vec<_>>(), vec!["a", "b"]);

    let rows = relating(store.conn(), "a", &RelationOptions::new()).expect("relating");
    assert_eq!(rows.iter().map(|r| r.id()).collect::<Vec<_>>(), vec!["page"]);

    store
        .update_relation(
            link.relation_id,
            &RelationPatch {
                position: Some(7),
                ..RelationPatch::default()
            },
        )
        .expect("update relation");
}

#[test]
fn unknown_ordering_is_ignored() {
    let store = store();
    store.create(NewEntity::new().with_id("p")).expect("p");
    store.create(NewEntity::new().with_id("q")).expect("q");
    store.relate(&NewRelation::new("p", "q")).expect("relate");

    let rows = related_by(store.conn(), "p", &RelationOptions::new().order_str("sideways"))
        .expect("related");
    assert_eq!(rows.len(), 1);
}

#[test]
fn contents_upsert_and_list_by_content() {
    let store = store();
    for (id, title) in [("one", "Zebra"), ("two", "Apple")] {
        store
            .create_with_contents(NewEntity::new().with_id(id), [("title", title)], None)
            .expect("create");
    }
    store
        .upsert_contents("one", [("title", "Mango")], None)
        .expect("upsert");
    store
        .upsert_contents("one", [("title", "Mango ES")], Some("es"))
        .expect("upsert es");

    let contents = store
        .contents("one", &ContentFilter::lang("en"))
        .expect("contents");
    assert_eq!(contents.len(), 1);
    assert_eq!(contents.text("title", "en"), Some("Mango"));

    let ordered = store
        .list(&EntityFilter::new().order_by_content("title", Direction::Asc, None))
        .expect("list");
    let ids: Vec<_> = ordered.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["two", "one"]);

    let matched = store
        .list(&EntityFilter::new().where_content("title", ContentOp::Like, "Man%", None))
        .expect("list");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, "one");
}

#[test]
fn archives_keep_snapshots() {
    let store = store();
    store
        .create_with_contents(NewEntity::new().with_id("doc"), [("body", "v1")], None)
        .expect("create");
    let first = store.archive("doc", None, Some("editor")).expect("archive");
    assert_eq!(first.payload["contents"]["en"]["body"], "v1");
    assert_eq!(first.created_by.as_deref(), Some("editor"));
}
