// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::action::{ActionPayload, ActionRequest};
use crate::clock::from_millis;
use crate::protocol::ConflictStrategy;
use serde_json::json;
use yare::parameterized;

fn populated_store() -> LocalStore {
    let store = LocalStore::open_in_memory().unwrap();
    store
        .put_document(&CachedDocument::new("doc-1", "ws-1", from_millis(0)).with_content("hello"))
        .unwrap();
    store
        .enqueue_action(ActionRequest::new("doc-1", ActionPayload::DeleteDocument))
        .unwrap();
    store.set_preference("theme", &json!("dark")).unwrap();
    store
        .put_sync_metadata(&SyncMetadata::new("node-a", ConflictStrategy::ThreeWayMerge))
        .unwrap();
    store.put_media("img", b"bytes", None).unwrap();
    store
}

#[test]
fn export_captures_every_collection() {
    let snapshot = populated_store().export_snapshot().unwrap();
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.documents.len(), 1);
    assert_eq!(snapshot.actions.len(), 1);
    assert_eq!(snapshot.preferences[0].key, "theme");
    assert_eq!(snapshot.sync_metadata[0].node_id, "node-a");
}

#[test]
fn import_replaces_local_state() {
    let source = populated_store();
    let snapshot = source.export_snapshot().unwrap();

    let target = LocalStore::open_in_memory().unwrap();
    target
        .put_document(&CachedDocument::new("stale", "ws-9", from_millis(0)))
        .unwrap();
    target.put_media("old", b"x", None).unwrap();

    target.import_snapshot(&snapshot).unwrap();

    assert!(target.find_document("stale").unwrap().is_none());
    assert_eq!(target.get_document("doc-1").unwrap().content, "hello");
    assert_eq!(target.list_actions(None).unwrap(), snapshot.actions);
    assert_eq!(target.get_preference("theme").unwrap(), Some(json!("dark")));
    assert_eq!(
        target.sync_metadata().unwrap().unwrap().conflict_strategy,
        ConflictStrategy::ThreeWayMerge
    );
    assert!(target.get_media("old").unwrap().is_none());
}

#[parameterized(
    minor_bump = { "1.3", true },
    same = { "1.0", true },
    major_bump = { "2.0", false },
    empty = { "", false },
    garbage = { "abc", false },
)]
fn version_compatibility(version: &str, ok: bool) {
    let snapshot = Snapshot {
        version: version.to_string(),
        documents: Vec::new(),
        actions: Vec::new(),
        preferences: Vec::new(),
        sync_metadata: Vec::new(),
    };
    assert_eq!(snapshot.check_version().is_ok(), ok);
}

#[test]
fn incompatible_import_changes_nothing() {
    let store = populated_store();
    let mut snapshot = store.export_snapshot().unwrap();
    snapshot.version = "2.0".into();
    snapshot.documents.clear();

    let err = store.import_snapshot(&snapshot).unwrap_err();
    assert!(matches!(err, Error::IncompatibleSnapshot { .. }));
    assert!(store.find_document("doc-1").unwrap().is_some());
}

#[test]
fn failed_import_rolls_back() {
    let store = populated_store();
    let mut snapshot = store.export_snapshot().unwrap();
    // Duplicate action IDs violate the unique constraint mid-import.
    let dup = snapshot.actions[0].clone();
    snapshot.actions.push(dup);

    assert!(store.import_snapshot(&snapshot).is_err());
    assert_eq!(store.list_actions(None).unwrap().len(), 1);
    assert!(store.get_media("img").unwrap().is_some());
}

#[test]
fn save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.json");
    let snapshot = populated_store().export_snapshot().unwrap();

    snapshot.save(&path).unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("syncMetadata").is_some());

    assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
}
