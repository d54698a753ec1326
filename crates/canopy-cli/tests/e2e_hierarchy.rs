//! E2E tests for hierarchy maintenance through the CLI: creating nested
//! entities, moving branches, rejecting cycles, and reading the closure back.
//!
//! Each test runs `cnp` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn cnp(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cnp"));
    cmd.current_dir(dir);
    cmd.env("CANOPY_LOG", "error");
    cmd.env_remove("CANOPY_FORMAT");
    cmd
}

fn init_project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    cnp(dir.path()).arg("init").assert().success();
    dir
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = cnp(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

fn create(dir: &Path, id: &str, parent: Option<&str>) -> Value {
    let mut args = vec!["create", "--id", id];
    if let Some(parent) = parent {
        args.extend(["--parent", parent]);
    }
    json_of(dir, &args)
}

fn ids(rows: &Value) -> Vec<String> {
    rows.as_array()
        .expect("array")
        .iter()
        .map(|row| row["id"].as_str().expect("id").to_string())
        .collect()
}

/// home > section > page
fn seed_chain(dir: &Path) {
    create(dir, "home", None);
    create(dir, "section", Some("home"));
    create(dir, "page", Some("section"));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn ancestors_follow_the_parent_chain() {
    let dir = init_project();
    seed_chain(dir.path());

    let rows = json_of(dir.path(), &["ancestors", "page"]);
    assert_eq!(ids(&rows), ["section", "home"]);

    let rows = json_of(dir.path(), &["ancestors", "page", "--order", "desc", "--meta"]);
    assert_eq!(ids(&rows), ["home", "section"]);
    assert_eq!(rows[0]["relation"]["depth"], 2);
    assert_eq!(rows[0]["relation"]["kind"], "ancestor");
}

#[test]
fn descendants_respect_max_depth() {
    let dir = init_project();
    seed_chain(dir.path());

    let rows = json_of(dir.path(), &["descendants", "home"]);
    assert_eq!(ids(&rows), ["section", "page"]);

    let rows = json_of(dir.path(), &["descendants", "home", "--max-depth", "1"]);
    assert_eq!(ids(&rows), ["section"]);
}

#[test]
fn move_rewrites_closure() {
    let dir = init_project();
    seed_chain(dir.path());
    create(dir.path(), "archive", None);

    let moved = json_of(dir.path(), &["move", "section", "--parent", "archive"]);
    assert_eq!(moved["parent_entity_id"], "archive");

    let rows = json_of(dir.path(), &["ancestors", "page"]);
    assert_eq!(ids(&rows), ["section", "archive"]);

    let root = json_of(dir.path(), &["root", "page"]);
    assert_eq!(root["id"], "archive");

    let rows = json_of(dir.path(), &["descendants", "home"]);
    assert!(ids(&rows).is_empty());
}

#[test]
fn move_to_none_detaches_branch() {
    let dir = init_project();
    seed_chain(dir.path());

    json_of(dir.path(), &["move", "section", "--parent", "none"]);
    let rows = json_of(dir.path(), &["ancestors", "page"]);
    assert_eq!(ids(&rows), ["section"]);

    let root = json_of(dir.path(), &["root", "section"]);
    assert!(root.is_null());
}

#[test]
fn cycle_is_rejected_with_code() {
    let dir = init_project();
    seed_chain(dir.path());

    let output = cnp(dir.path())
        .args(["move", "home", "--parent", "page", "--json"])
        .output()
        .expect("move should not crash");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(err["error"]["error_code"], "E2003");

    // Closure untouched.
    let rows = json_of(dir.path(), &["ancestors", "page"]);
    assert_eq!(ids(&rows), ["section", "home"]);
}

#[test]
fn self_parent_is_a_cycle_in_text_mode() {
    let dir = init_project();
    create(dir.path(), "solo", None);

    cnp(dir.path())
        .args(["move", "solo", "--parent", "solo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2003]"));
}

#[test]
fn unknown_parent_is_not_found() {
    let dir = init_project();
    create(dir.path(), "a", None);

    cnp(dir.path())
        .args(["move", "a", "--parent", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn children_and_siblings() {
    let dir = init_project();
    create(dir.path(), "home", None);
    create(dir.path(), "a", Some("home"));
    create(dir.path(), "b", Some("home"));
    create(dir.path(), "c", Some("home"));

    let mut children = ids(&json_of(dir.path(), &["children", "home"]));
    children.sort();
    assert_eq!(children, ["a", "b", "c"]);

    let mut siblings = ids(&json_of(dir.path(), &["siblings", "b"]));
    siblings.sort();
    assert_eq!(siblings, ["a", "c"]);

    let mut with_self = ids(&json_of(dir.path(), &["siblings", "b", "--include-self"]));
    with_self.sort();
    assert_eq!(with_self, ["a", "b", "c"]);
}

#[test]
fn tree_prints_outline() {
    let dir = init_project();
    seed_chain(dir.path());

    cnp(dir.path())
        .args(["tree", "home"])
        .assert()
        .success()
        .stdout(predicate::str::contains("home (Entity)\n  section (Entity)\n    page (Entity)"));

    let tree = json_of(dir.path(), &["tree", "home"]);
    assert_eq!(tree[0]["id"], "home");
    assert_eq!(tree[0]["children"][0]["children"][0]["id"], "page");
}

#[test]
fn force_delete_promotes_children_to_roots() {
    let dir = init_project();
    seed_chain(dir.path());

    json_of(dir.path(), &["delete", "section", "--force"]);

    let page = json_of(dir.path(), &["show", "page"]);
    assert!(page["parent_entity_id"].is_null());
    let rows = json_of(dir.path(), &["ancestors", "page"]);
    assert!(ids(&rows).is_empty());
}
