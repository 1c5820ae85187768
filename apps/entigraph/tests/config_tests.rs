//! Tests for configuration parsing and the store commands.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use entigraph::cli::{IngestTarget, PassArg, cmd_gc, cmd_ingest, cmd_init, open_store};
use entigraph::config::AppConfig;
use entigraph_core::{Cardinality, CollectionKey, EntigraphError, TypeKey};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FEED_CONFIG: &str = r#"
[[schema]]
type = "post"
relations = { viewer = { target = "viewer" }, comments = { target = "comment", cardinality = "many" } }

[[schema]]
type = "viewer"

[[schema]]
type = "comment"
id = ["post", "seq"]

[gc.default]
ttl_ms = 86400000
max = 500

[gc.types.viewer]
max = 2

[persist]
namespace = "feed"
version = 3
throttle_ms = 0
"#;

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_full_config_parses() {
    let config = AppConfig::from_toml(FEED_CONFIG).unwrap();

    assert_eq!(config.schema.len(), 3);
    let post = &config.schema[0];
    assert_eq!(post.type_key, TypeKey::from("post"));
    assert_eq!(
        post.relations.get("comments").map(|r| r.cardinality),
        Some(Cardinality::Many)
    );
    assert_eq!(
        post.relations.get("viewer").map(|r| r.cardinality),
        Some(Cardinality::One)
    );
    assert_eq!(config.schema[2].id, vec!["post", "seq"]);

    assert_eq!(config.gc.default.max, 500);
    let viewer = config.gc.policy_for(&TypeKey::from("viewer"));
    assert_eq!(viewer.max, 2);
    // Unset fields of a per-type policy fall back to the built-in default.
    assert_eq!(viewer.ttl_ms, entigraph_core::primitives::DEFAULT_TTL_MS);

    assert_eq!(config.persist.namespace, "feed");
    assert_eq!(config.persist.version, 3);
    assert_eq!(config.maintenance.interval_secs, 60);
}

#[test]
fn test_registry_and_gc_build() {
    let config = AppConfig::from_toml(FEED_CONFIG).unwrap();
    let registry = config.registry().unwrap();

    assert_eq!(registry.len(), 3);
    assert!(config.garbage_collector(&registry).is_ok());
}

#[test]
fn test_unknown_relation_target_rejected() {
    let config = AppConfig::from_toml(
        r#"
[[schema]]
type = "post"
relations = { viewer = { target = "viewer" } }
"#,
    )
    .unwrap();

    let result = config.registry();
    assert!(matches!(
        result,
        Err(EntigraphError::UnknownRelationTarget { target, .. })
            if target == TypeKey::from("viewer")
    ));
}

#[test]
fn test_policy_for_unknown_type_rejected() {
    let config = AppConfig::from_toml(
        r#"
[[schema]]
type = "post"

[gc.types.ghost]
max = 1
"#,
    )
    .unwrap();

    let registry = config.registry().unwrap();
    let result = config.garbage_collector(&registry);
    assert!(matches!(
        result,
        Err(EntigraphError::UnknownPolicyType(t)) if t == TypeKey::from("ghost")
    ));
}

#[test]
fn test_malformed_toml_is_invalid_config() {
    let result = AppConfig::from_toml("[[schema]\ntype = ");
    assert!(matches!(result, Err(EntigraphError::InvalidConfig(_))));
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = AppConfig::load(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(EntigraphError::IoError(_))));
}

// =============================================================================
// COMMAND TESTS
// =============================================================================

fn workspace() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("entigraph.toml");
    std::fs::write(&config, FEED_CONFIG).unwrap();
    let db = dir.path().join("store.redb");
    (dir, config, db)
}

fn write_payload(dir: &Path, name: &str, payload: &serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec(payload).unwrap()).unwrap();
    path
}

#[test]
fn test_init_refuses_existing_database() {
    let (_dir, config, db) = workspace();

    cmd_init(&config, &db, false).unwrap();
    assert!(db.exists());
    assert!(matches!(
        cmd_init(&config, &db, false),
        Err(EntigraphError::InvalidConfig(_))
    ));
    cmd_init(&config, &db, true).unwrap();
}

#[test]
fn test_ingest_collection_survives_reopen() {
    let (dir, config, db) = workspace();
    let payload = serde_json::json!([
        {"id": 1, "viewer": {"id": 10, "name": "Anna"}},
        {"id": 2, "viewer": {"id": 11, "name": "Ben"}},
    ]);
    let file = write_payload(dir.path(), "feed.json", &payload);

    let target = IngestTarget {
        type_key: "post".to_string(),
        collection: Some("feed".to_string()),
        group: None,
        append: false,
        limit: 20,
    };
    cmd_ingest(&config, &db, true, &file, &target).unwrap();

    let store = open_store(&config, &db).unwrap();
    assert!(store.bootstrap.wiped.is_none());
    assert_eq!(store.bootstrap.restored.records, 4);
    let feed = store.session.list(&CollectionKey::new("feed"));
    assert_eq!(feed.len(), 2);
    assert_eq!(
        feed[1].one("viewer").and_then(|v| v.text("name")),
        Some("Ben")
    );
}

#[test]
fn test_gc_command_applies_lru_policy() {
    let (dir, config, db) = workspace();
    let payload = serde_json::json!([
        {"id": 1, "viewer": {"id": 10}},
        {"id": 2, "viewer": {"id": 11}},
        {"id": 3, "viewer": {"id": 12}},
    ]);
    let file = write_payload(dir.path(), "posts.json", &payload);
    let target = IngestTarget {
        type_key: "post".to_string(),
        collection: None,
        group: None,
        append: false,
        limit: 20,
    };
    cmd_ingest(&config, &db, true, &file, &target).unwrap();

    // viewer max = 2: the first-inserted viewer goes.
    cmd_gc(&config, &db, true, PassArg::Lru).unwrap();

    let store = open_store(&config, &db).unwrap();
    assert_eq!(store.bootstrap.restored.records, 5);
    assert!(store.session.get_entity("viewer", "10").is_none());
    // Post 1 lost its only reference and is isolated at startup.
    assert_eq!(store.bootstrap.gc.total(), 1);
    assert!(store.session.get_entity("post", "1").is_none());
    assert_eq!(store.session.entities().len(), 4);
}
