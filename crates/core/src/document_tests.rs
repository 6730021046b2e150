// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::clock::from_millis;
use yare::parameterized;

#[parameterized(
    synced = { "synced", SyncStatus::Synced },
    pending = { "Pending", SyncStatus::Pending },
    conflict = { "conflict", SyncStatus::Conflict },
)]
fn sync_status_from_str(input: &str, expected: SyncStatus) {
    assert_eq!(input.parse::<SyncStatus>().unwrap(), expected);
    assert_eq!(expected.to_string(), input.to_lowercase());
}

#[test]
fn sync_status_rejects_unknown() {
    assert!(matches!(
        "dirty".parse::<SyncStatus>(),
        Err(Error::InvalidSyncStatus(_))
    ));
}

#[test]
fn new_document_is_synced_and_empty() {
    let doc = CachedDocument::new("doc-1", "ws-1", from_millis(5));
    assert_eq!(doc.sync_status, SyncStatus::Synced);
    assert!(doc.content.is_empty());
    assert!(!doc.has_local_changes());
    assert_eq!(doc.version, 0);
}

#[test]
fn record_local_applies_and_marks_pending() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(5)).with_content("ac");
    doc.record_local(vec![Operation::insert(1, "b", "n1", from_millis(6))])
        .unwrap();

    assert_eq!(doc.content, "abc");
    assert_eq!(doc.base_content, "ac");
    assert_eq!(doc.sync_status, SyncStatus::Pending);
    assert_eq!(doc.local_changes.len(), 1);
}

#[test]
fn mark_synced_clears_changes_and_moves_baseline() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(5));
    doc.record_local(vec![Operation::update("x", "n1", from_millis(6))])
        .unwrap();
    doc.mark_synced();

    assert_eq!(doc.sync_status, SyncStatus::Synced);
    assert!(doc.local_changes.is_empty());
    assert_eq!(doc.base_content, "x");
}

#[test]
fn normalize_forces_pending_with_changes() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(5));
    doc.local_changes
        .push(Operation::update("y", "n1", from_millis(6)));
    doc.normalize();
    assert_eq!(doc.sync_status, SyncStatus::Pending);
}

#[test]
fn normalize_keeps_conflict() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(5));
    doc.sync_status = SyncStatus::Conflict;
    doc.normalize();
    assert!(doc.in_conflict());
}

#[test]
fn serializes_camel_case() {
    let doc = CachedDocument::new("doc-1", "ws-1", from_millis(5)).with_title("Notes");
    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["workspaceId"], "ws-1");
    assert_eq!(json["syncStatus"], "synced");
    assert!(json.get("collectionId").is_none());
    assert!(json.get("conflict").is_none());

    let back: CachedDocument = serde_json::from_value(json).unwrap();
    assert_eq!(back, doc);
}

fn clock(entries: &[(&str, u64)]) -> VectorClock {
    VectorClock::from_iter(entries.iter().copied())
}

#[test]
fn rebase_shifts_over_unseen_edits() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(0)).with_content("hello world");
    // This copy already holds "B: " at the front, which node-a never saw.
    doc.record_applied(
        clock(&[("node-b", 1)]),
        vec![Operation::insert(0, "B: ", "node-b", from_millis(2))],
    );

    let rebased = doc.rebase(
        &clock(&[("node-a", 1)]),
        &[Operation::insert(11, "!", "node-a", from_millis(1))],
    );

    assert_eq!(rebased[0].position, Some(14));
}

#[test]
fn rebase_skips_edits_the_author_saw() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(0));
    doc.record_applied(
        clock(&[("node-b", 1)]),
        vec![Operation::insert(0, "B: ", "node-b", from_millis(2))],
    );
    let ops = vec![Operation::insert(11, "!", "node-a", from_millis(3))];

    let rebased = doc.rebase(&clock(&[("node-a", 1), ("node-b", 1)]), &ops);

    assert_eq!(rebased, ops);
}

#[test]
fn history_is_bounded() {
    let mut doc = CachedDocument::new("doc-1", "ws-1", from_millis(0));
    for i in 0..(HISTORY_LIMIT as u64 + 5) {
        doc.record_applied(
            clock(&[("node-a", i + 1)]),
            vec![Operation::insert(0, "x", "node-a", from_millis(i as i64))],
        );
    }
    doc.record_applied(clock(&[("node-a", 999)]), Vec::new());

    assert_eq!(doc.history.len(), HISTORY_LIMIT);
    assert_eq!(doc.history[0].vector_clock.get("node-a"), 6);
}
