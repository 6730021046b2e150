// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::action::{ActionPayload, Priority};
use crate::clock::{ManualClock, VectorClock};
use crate::document::Conflict;
use crate::op::Operation;
use crate::protocol::ConflictStrategy;
use serde_json::json;

fn store_at(ms: i64) -> (LocalStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(ms));
    let store = LocalStore::open_in_memory()
        .unwrap()
        .with_clock(clock.clone());
    (store, clock)
}

fn update(content: &str) -> ActionRequest {
    ActionRequest::new(
        "doc-1",
        ActionPayload::UpdateDocument {
            content: content.into(),
            title: None,
        },
    )
}

fn synced_doc(id: &str, content: &str, ms: i64) -> CachedDocument {
    CachedDocument::new(id, "ws-1", from_millis(ms)).with_content(content)
}

#[test]
fn put_and_get_document() {
    let (store, _) = store_at(1_000);
    let mut doc = synced_doc("doc-1", "hello", 0).with_title("Notes");
    doc.vector_clock.increment("node-a");
    doc.metadata.insert("tag".into(), json!("draft"));

    store.put_document(&doc).unwrap();
    let loaded = store.get_document("doc-1").unwrap();

    assert_eq!(loaded.title, "Notes");
    assert_eq!(loaded.content, "hello");
    assert_eq!(loaded.vector_clock.get("node-a"), 1);
    assert_eq!(loaded.metadata["tag"], json!("draft"));
    assert_eq!(loaded.last_modified, from_millis(1_000));
    assert_eq!(loaded.version, 1);
}

#[test]
fn get_missing_document_errors() {
    let (store, _) = store_at(0);
    assert!(matches!(
        store.get_document("nope"),
        Err(Error::DocumentNotFound(_))
    ));
    assert!(store.find_document("nope").unwrap().is_none());
}

#[test]
fn local_content_change_on_synced_document_forces_pending() {
    let (store, clock) = store_at(1_000);
    store.put_synced_document(&synced_doc("doc-1", "v1", 500)).unwrap();

    clock.advance(10);
    let mut doc = store.get_document("doc-1").unwrap();
    doc.content = "v2".into();
    let stored = store.put_document(&doc).unwrap();

    assert_eq!(stored.sync_status, SyncStatus::Pending);
    assert_eq!(stored.last_modified, from_millis(1_010));
}

#[test]
fn local_write_without_content_change_keeps_synced() {
    let (store, _) = store_at(1_000);
    store.put_synced_document(&synced_doc("doc-1", "v1", 500)).unwrap();

    let doc = store.get_document("doc-1").unwrap().with_title("Renamed");
    let stored = store.put_document(&doc).unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
}

#[test]
fn version_only_increases() {
    let (store, _) = store_at(1_000);
    let mut doc = synced_doc("doc-1", "a", 0);
    doc.version = 7;
    store.put_synced_document(&doc).unwrap();

    doc.version = 3;
    assert_eq!(store.put_synced_document(&doc).unwrap().version, 7);
    assert_eq!(store.put_document(&doc).unwrap().version, 8);
}

#[test]
fn sync_write_keeps_timestamp() {
    let (store, _) = store_at(9_999);
    let stored = store.put_synced_document(&synced_doc("doc-1", "a", 42)).unwrap();
    assert_eq!(stored.last_modified, from_millis(42));
}

#[test]
fn local_changes_persist_as_pending() {
    let (store, _) = store_at(0);
    let mut doc = synced_doc("doc-1", "ab", 0);
    doc.local_changes
        .push(Operation::insert(1, "x", "node-a", from_millis(1)));
    let stored = store.put_synced_document(&doc).unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Pending);

    let loaded = store.get_document("doc-1").unwrap();
    assert_eq!(loaded.local_changes.len(), 1);
}

#[test]
fn conflict_round_trips() {
    let (store, _) = store_at(0);
    let mut doc = synced_doc("doc-1", "A", 0);
    doc.sync_status = SyncStatus::Conflict;
    doc.conflict = Some(Conflict {
        local: "A".into(),
        remote: "B".into(),
        remote_clock: [("node-b", 1)].into_iter().collect(),
        detected_at: from_millis(5),
    });
    store.put_synced_document(&doc).unwrap();

    let loaded = store.get_document("doc-1").unwrap();
    assert!(loaded.in_conflict());
    assert_eq!(loaded.conflict.unwrap().remote, "B");
}

#[test]
fn list_documents_by_status() {
    let (store, _) = store_at(0);
    store.put_synced_document(&synced_doc("a", "x", 1)).unwrap();
    let mut pending = synced_doc("b", "y", 2);
    pending.sync_status = SyncStatus::Pending;
    store.put_synced_document(&pending).unwrap();

    assert_eq!(store.list_documents(None).unwrap().len(), 2);
    let ids: Vec<_> = store
        .pending_documents()
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(ids, vec!["b"]);
}

#[test]
fn bulk_delete_documents() {
    let (store, _) = store_at(0);
    for id in ["a", "b", "c"] {
        store.put_synced_document(&synced_doc(id, "x", 0)).unwrap();
    }
    assert_eq!(store.delete_documents(&["a", "c", "zzz"]).unwrap(), 2);
    assert_eq!(store.list_documents(None).unwrap().len(), 1);
    assert!(!store.delete_document("a").unwrap());
    assert!(store.delete_document("b").unwrap());
}

#[test]
fn enqueue_assigns_id_and_timestamp() {
    let (store, _) = store_at(1_234);
    let action = store.enqueue_action(update("hello")).unwrap();

    assert!(action.id.starts_with("act-"));
    assert_eq!(action.created_at, from_millis(1_234));
    assert_eq!(store.get_action(&action.id).unwrap(), action);
}

#[test]
fn identical_requests_get_distinct_ids() {
    let (store, _) = store_at(0);
    let a = store.enqueue_action(update("x")).unwrap();
    let b = store.enqueue_action(update("x")).unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn pending_actions_order_by_priority_then_creation() {
    let (store, clock) = store_at(0);
    for priority in [Priority::Normal, Priority::Critical, Priority::Low, Priority::High] {
        clock.advance(1);
        store
            .enqueue_action(update("x").with_priority(priority))
            .unwrap();
    }
    clock.advance(1);
    let second_normal = store.enqueue_action(update("y")).unwrap();

    let order: Vec<_> = store
        .pending_actions()
        .unwrap()
        .into_iter()
        .map(|a| a.priority)
        .collect();
    assert_eq!(
        order,
        vec![
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Normal,
            Priority::Low
        ]
    );
    let pending = store.pending_actions().unwrap();
    assert_eq!(pending[3].id, second_normal.id);
}

#[test]
fn due_actions_skip_backoff() {
    let (store, _) = store_at(0);
    let mut action = store.enqueue_action(update("x")).unwrap();
    action.next_attempt_at = Some(from_millis(500));
    action.retry_count = 1;
    action.last_error = Some("timeout".into());
    store.update_action(&action).unwrap();

    assert!(store.due_actions(from_millis(499)).unwrap().is_empty());
    let due = store.due_actions(from_millis(500)).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].retry_count, 1);
    assert_eq!(due[0].last_error.as_deref(), Some("timeout"));
}

#[test]
fn update_missing_action_errors() {
    let (store, _) = store_at(0);
    let action = store.enqueue_action(update("x")).unwrap();
    store.delete_action(&action.id).unwrap();
    assert!(matches!(
        store.update_action(&action),
        Err(Error::ActionNotFound(_))
    ));
    assert!(matches!(
        store.set_action_status(&action.id, ActionStatus::Failed),
        Err(Error::ActionNotFound(_))
    ));
}

#[test]
fn reset_processing_recovers_interrupted_actions() {
    let (store, _) = store_at(0);
    let a = store.enqueue_action(update("x")).unwrap();
    let b = store.enqueue_action(update("y")).unwrap();
    store.set_action_status(&a.id, ActionStatus::Processing).unwrap();
    store.set_action_status(&b.id, ActionStatus::Failed).unwrap();

    assert_eq!(store.reset_processing_actions().unwrap(), 1);
    let counts = store.action_counts().unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.processing, 0);
}

#[test]
fn delete_actions_with_status_only_touches_that_status() {
    let (store, _) = store_at(0);
    let a = store.enqueue_action(update("x")).unwrap();
    store.enqueue_action(update("y")).unwrap();
    store.set_action_status(&a.id, ActionStatus::Failed).unwrap();

    assert_eq!(store.delete_actions_with_status(ActionStatus::Failed).unwrap(), 1);
    assert_eq!(store.action_counts().unwrap().total(), 1);
}

#[test]
fn action_quota_evicts_oldest_failed_first() {
    let clock = Arc::new(ManualClock::new(0));
    let store = LocalStore::open_in_memory()
        .unwrap()
        .with_clock(clock.clone())
        .with_quota(Quota {
            max_actions: 3,
            ..Quota::default()
        });

    let failed_old = store.enqueue_action(update("1")).unwrap();
    clock.advance(1);
    let failed_new = store.enqueue_action(update("2")).unwrap();
    clock.advance(1);
    let pending = store.enqueue_action(update("3")).unwrap();
    store.set_action_status(&failed_old.id, ActionStatus::Failed).unwrap();
    store.set_action_status(&failed_new.id, ActionStatus::Failed).unwrap();

    clock.advance(1);
    store.enqueue_action(update("4")).unwrap();

    assert!(store.find_action(&failed_old.id).unwrap().is_none());
    assert!(store.find_action(&failed_new.id).unwrap().is_some());
    assert!(store.find_action(&pending.id).unwrap().is_some());
}

#[test]
fn action_quota_never_evicts_pending() {
    let store = LocalStore::open_in_memory().unwrap().with_quota(Quota {
        max_actions: 2,
        ..Quota::default()
    });
    store.enqueue_action(update("1")).unwrap();
    store.enqueue_action(update("2")).unwrap();

    let err = store.enqueue_action(update("3")).unwrap_err();
    assert!(err.is_quota());
    assert_eq!(store.action_counts().unwrap().pending, 2);
}

#[test]
fn document_quota_evicts_oldest_synced_only() {
    let store = LocalStore::open_in_memory().unwrap().with_quota(Quota {
        max_document_bytes: 45,
        ..Quota::default()
    });
    // Each document accounts 20 bytes: content plus synced baseline.
    store.put_synced_document(&synced_doc("old", "0123456789", 1)).unwrap();
    let mut pending = synced_doc("pending", "0123456789", 0);
    pending.sync_status = SyncStatus::Pending;
    store.put_synced_document(&pending).unwrap();

    store.put_synced_document(&synced_doc("new", "abcdefghij", 2)).unwrap();
    assert!(store.find_document("old").unwrap().is_none());
    assert!(store.find_document("pending").unwrap().is_some());

    // Evicting "new" would not make room, so the failed write changes nothing.
    let mut huge = synced_doc("huge", "", 3);
    huge.content = "x".repeat(30);
    huge.sync_status = SyncStatus::Pending;
    let err = store.put_synced_document(&huge).unwrap_err();
    assert!(err.is_quota());
    assert!(store.find_document("new").unwrap().is_some());
}

#[test]
fn document_quota_reports_error_when_nothing_evictable() {
    let store = LocalStore::open_in_memory().unwrap().with_quota(Quota {
        max_document_bytes: 10,
        ..Quota::default()
    });
    let mut doc = synced_doc("big", "", 0);
    doc.content = "0123456789abc".into();
    doc.sync_status = SyncStatus::Pending;

    let err = store.put_document(&doc).unwrap_err();
    assert!(matches!(err, Error::QuotaExceeded { collection: "documents" }));
}

#[test]
fn preferences_crud() {
    let (store, _) = store_at(0);
    assert!(store.get_preference("theme").unwrap().is_none());

    store.set_preference("theme", &json!("dark")).unwrap();
    store.set_preference("theme", &json!({"mode": "light"})).unwrap();
    assert_eq!(
        store.get_preference("theme").unwrap(),
        Some(json!({"mode": "light"}))
    );
    assert_eq!(store.list_preferences().unwrap().len(), 1);

    assert!(store.delete_preference("theme").unwrap());
    assert!(!store.delete_preference("theme").unwrap());
}

#[test]
fn sync_metadata_singleton() {
    let (store, _) = store_at(0);
    assert!(store.sync_metadata().unwrap().is_none());

    let mut meta = SyncMetadata::new("node-a", ConflictStrategy::Manual);
    meta.vector_clock = [("node-a", 3)].into_iter().collect::<VectorClock>();
    store.put_sync_metadata(&meta).unwrap();

    meta.last_sync_time = Some(from_millis(77));
    store.put_sync_metadata(&meta).unwrap();

    assert_eq!(store.sync_metadata().unwrap(), Some(meta));
}

#[test]
fn media_expires() {
    let (store, clock) = store_at(0);
    store
        .put_media("img", b"png-bytes", Some(Duration::milliseconds(100)))
        .unwrap();
    assert_eq!(store.get_media("img").unwrap().unwrap(), b"png-bytes");

    clock.advance(100);
    assert!(store.get_media("img").unwrap().is_none());
}

#[test]
fn media_quota_evicts_expired_then_oldest() {
    let clock = Arc::new(ManualClock::new(0));
    let store = LocalStore::open_in_memory()
        .unwrap()
        .with_clock(clock.clone())
        .with_quota(Quota {
            max_media_bytes: 10,
            ..Quota::default()
        });

    store.put_media("oldest", b"aaaa", None).unwrap();
    clock.advance(1);
    store
        .put_media("expiring", b"bbbb", Some(Duration::milliseconds(5)))
        .unwrap();
    clock.advance(10);

    // Expired entry goes first; that alone makes room.
    store.put_media("c", b"cccc", None).unwrap();
    assert!(store.get_media("oldest").unwrap().is_some());

    // Now the oldest live entry has to go.
    store.put_media("d", b"dddd", None).unwrap();
    assert!(store.get_media("oldest").unwrap().is_none());
    assert!(store.get_media("c").unwrap().is_some());
    assert!(store.media_bytes().unwrap() <= 10);
}

#[test]
fn enforce_quota_reports_evictions() {
    let (store, _) = store_at(0);
    store.put_synced_document(&synced_doc("a", "0123456789", 1)).unwrap();
    let store = store.with_quota(Quota {
        max_document_bytes: 5,
        ..Quota::default()
    });

    let report = store.enforce_quota().unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(store.document_bytes().unwrap(), 0);
}

#[test]
fn open_on_disk_is_persistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("kn.db");
    {
        let store = LocalStore::open(&path).unwrap();
        assert!(store.capabilities().persistent);
        store.put_document(&synced_doc("doc-1", "kept", 0)).unwrap();
    }
    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.get_document("doc-1").unwrap().content, "kept");
}

#[test]
fn open_or_memory_degrades_when_path_unusable() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "not a directory").unwrap();

    let store = LocalStore::open_or_memory(&blocker.join("kn.db")).unwrap();
    assert!(!store.capabilities().persistent);
    store.put_document(&synced_doc("doc-1", "x", 0)).unwrap();
}

#[test]
fn migration_adds_retry_columns_to_old_stores() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE actions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            priority TEXT NOT NULL DEFAULT 'normal',
            priority_rank INTEGER NOT NULL DEFAULT 2
        );",
    )
    .unwrap();

    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();

    let has_last_error: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('actions') WHERE name = 'last_error'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(has_last_error);
}

#[test]
fn migration_adds_history_to_old_document_tables() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE documents (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            collection_id TEXT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            base_content TEXT NOT NULL DEFAULT '',
            version INTEGER NOT NULL,
            last_modified INTEGER NOT NULL,
            sync_status TEXT NOT NULL,
            local_changes TEXT NOT NULL DEFAULT '[]',
            vector_clock TEXT NOT NULL DEFAULT '{}',
            conflict TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            size_bytes INTEGER NOT NULL
        );
        INSERT INTO documents (id, workspace_id, title, content, version, last_modified,
            sync_status, size_bytes)
        VALUES ('doc-1', 'ws-1', '', 'old', 1, 0, 'synced', 3);",
    )
    .unwrap();

    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();

    let history: String = conn
        .query_row("SELECT history FROM documents WHERE id = 'doc-1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(history, "[]");
}

#[test]
fn document_history_is_stored() {
    let store = LocalStore::open_in_memory().unwrap();
    let mut doc = synced_doc("doc-1", "hello", 0);
    doc.record_applied(
        VectorClock::from_iter([("node-a", 1)]),
        vec![Operation::insert(5, "!", "node-a", from_millis(1))],
    );
    store.put_synced_document(&doc).unwrap();

    let stored = store.get_document("doc-1").unwrap();
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].vector_clock.get("node-a"), 1);
}
