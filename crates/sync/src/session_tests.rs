// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::clock::RuntimeClock;
use crate::remote::RemoteDocument;
use crate::test_helpers::{MemoryAuthority, ScriptedProbe};
use kn_core::{ActionKind, ActionStatus, OpKind};
use serde_json::json;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

struct Harness {
    services: SessionServices,
    authority: Arc<MemoryAuthority>,
    probe: Arc<ScriptedProbe>,
}

impl Harness {
    async fn new(online: bool) -> Self {
        Self::with_config(online, SyncConfig::default()).await
    }

    /// Autosave pushed far out so only the debounce saves.
    async fn debounce_only(online: bool) -> Self {
        let config = SyncConfig {
            autosave_offline_ms: 600_000,
            autosave_online_ms: 600_000,
            ..SyncConfig::default()
        };
        Self::with_config(online, config).await
    }

    async fn with_config(online: bool, config: SyncConfig) -> Self {
        let store = Arc::new(
            LocalStore::open_in_memory()
                .unwrap()
                .with_clock(Arc::new(RuntimeClock::starting_at(1_000_000))),
        );
        let authority = MemoryAuthority::new();
        let probe = if online {
            ScriptedProbe::online()
        } else {
            ScriptedProbe::offline()
        };
        let events = EventBus::new();
        let monitor = ConnectivityMonitor::new(probe.clone(), &config, events.clone());
        monitor.refresh().await;
        let remote = Some(authority.clone() as Arc<dyn Remote>);
        let queue = ActionQueue::new(
            store.clone(),
            remote.clone(),
            monitor.clone(),
            events.clone(),
            config.clone(),
        );
        Harness {
            services: SessionServices {
                node_id: "node-a".into(),
                workspace_id: "ws-1".into(),
                store,
                remote,
                monitor,
                queue,
                events,
                config,
            },
            authority,
            probe,
        }
    }

    fn store(&self) -> &LocalStore {
        &self.services.store
    }

    fn session(&self) -> EditingSession {
        EditingSession::new(self.services.clone())
    }

    async fn open(&self, id: &str) -> EditingSession {
        let session = self.session();
        session.initialize(id).await.unwrap();
        session
    }

    fn seed(&self, id: &str, content: &str) {
        let mut doc = CachedDocument::new(id, "ws-1", self.store().now()).with_content(content);
        doc.mark_synced();
        self.store().put_synced_document(&doc).unwrap();
    }

    async fn go_offline(&self) {
        self.probe.set_offline();
        self.services.monitor.refresh().await;
    }
}

#[tokio::test(start_paused = true)]
async fn initialize_loads_cached_document() {
    let h = Harness::new(false).await;
    h.seed("doc-1", "hello");
    let mut events = h.services.events.subscribe();

    let session = h.open("doc-1").await;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.content().as_deref(), Some("hello"));
    assert_eq!(
        events.recv().await,
        Some(SyncEvent::Initialized {
            document_id: "doc-1".into()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn initialize_fetches_missing_document_when_online() {
    let h = Harness::new(true).await;
    h.authority.put_document(RemoteDocument {
        id: "doc-1".into(),
        workspace_id: "ws-1".into(),
        collection_id: None,
        title: "Notes".into(),
        content: "from server".into(),
        vector_clock: [("node-b", 2)].into_iter().collect(),
        updated_at: None,
    });

    let session = h.open("doc-1").await;

    assert_eq!(session.content().as_deref(), Some("from server"));
    let cached = h.store().get_document("doc-1").unwrap();
    assert_eq!(cached.sync_status, SyncStatus::Synced);
    assert_eq!(cached.vector_clock.get("node-b"), 2);
}

#[tokio::test(start_paused = true)]
async fn initialize_offline_starts_unsaved_draft() {
    let h = Harness::new(false).await;

    let session = h.open("new-doc").await;

    assert_eq!(session.content().as_deref(), Some(""));
    assert!(h.store().find_document("new-doc").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn unknown_remote_document_starts_draft() {
    let h = Harness::new(true).await;
    let session = h.open("unknown").await;
    assert_eq!(session.content().as_deref(), Some(""));
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn initialize_twice_fails() {
    let h = Harness::new(false).await;
    let session = h.open("doc-1").await;
    let err = session.initialize("doc-1").await.unwrap_err();
    assert!(matches!(err, Error::SessionNotReady(_)));
}

#[tokio::test(start_paused = true)]
async fn edits_require_ready_session() {
    let h = Harness::new(false).await;
    let session = h.session();
    assert!(matches!(
        session.handle_insert(0, "x").unwrap_err(),
        Error::SessionNotReady(_)
    ));

    session.initialize("doc-1").await.unwrap();
    session.destroy().unwrap();
    assert!(matches!(
        session.handle_change("y").unwrap_err(),
        Error::SessionNotReady(_)
    ));
    assert_eq!(session.state(), SessionState::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn edits_update_content_and_emit_changes() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "hello world");
    let session = h.open("doc-1").await;
    let mut events = h.services.events.subscribe();

    session.handle_insert(5, ",").unwrap();
    let delete = session.handle_delete(6, 6).unwrap();
    session.handle_insert(6, " there").unwrap();

    assert_eq!(session.content().as_deref(), Some("hello, there"));
    assert_eq!(delete.kind, OpKind::Delete);
    assert_eq!(delete.content.as_deref(), Some(" world"));

    match events.recv().await {
        Some(SyncEvent::Change {
            document_id,
            operation,
        }) => {
            assert_eq!(document_id, "doc-1");
            assert_eq!(operation.kind, OpKind::Insert);
        }
        other => unreachable!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn format_leaves_text_alone() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "bold move");
    let session = h.open("doc-1").await;

    let mut attributes = BTreeMap::new();
    attributes.insert("bold".to_string(), json!(true));
    let op = session.handle_format(0, 4, attributes).unwrap();

    assert_eq!(op.kind, OpKind::Format);
    assert_eq!(session.content().as_deref(), Some("bold move"));
    assert!(session.get_save_status().has_unsaved_changes);
}

#[tokio::test(start_paused = true)]
async fn save_is_debounced_after_last_edit() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "");
    let session = h.open("doc-1").await;

    session.handle_insert(0, "a").unwrap();
    tokio::time::sleep(ms(400)).await;
    session.handle_insert(1, "b").unwrap();
    tokio::time::sleep(ms(400)).await;
    assert!(session.get_save_status().has_unsaved_changes);
    assert_eq!(h.store().get_document("doc-1").unwrap().content, "");

    tokio::time::sleep(ms(150)).await;
    let status = session.get_save_status();
    assert!(!status.has_unsaved_changes);
    assert!(status.last_saved.is_some());

    let stored = h.store().get_document("doc-1").unwrap();
    assert_eq!(stored.content, "ab");
    assert_eq!(stored.local_changes.len(), 2);
    assert_eq!(stored.sync_status, SyncStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn offline_save_does_not_queue_actions() {
    let h = Harness::debounce_only(false).await;
    let session = h.open("doc-1").await;

    session.handle_change("draft").unwrap();
    session.save().unwrap();

    let stored = h.store().get_document("doc-1").unwrap();
    assert_eq!(stored.content, "draft");
    assert_eq!(stored.workspace_id, "ws-1");
    assert!(h.services.queue.list(None).unwrap().is_empty());
    assert_eq!(session.get_save_status().sync_status, SyncStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn online_save_queues_full_content_update() {
    let h = Harness::debounce_only(true).await;
    h.seed("doc-1", "v1");
    h.authority.put_document(RemoteDocument::from(
        &h.store().get_document("doc-1").unwrap(),
    ));
    let session = h.open("doc-1").await;
    let mut events = h.services.events.subscribe();

    session.handle_change("v2").unwrap();
    session.save().unwrap();

    let mut saved = Vec::new();
    while let Some(event) = events.try_recv() {
        if let SyncEvent::Saved { document_id, .. } = event {
            saved.push(document_id);
        }
    }
    assert_eq!(saved, ["doc-1"]);
    h.services.queue.process().await;

    let delivered = h.authority.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind(), ActionKind::Update);
    assert_eq!(h.authority.document("doc-1").unwrap().content, "v2");
    assert_eq!(session.get_save_status().sync_status, SyncStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn editing_a_conflicted_document_keeps_it_held() {
    let h = Harness::debounce_only(true).await;
    h.seed("doc-1", "mine");
    let mut doc = h.store().get_document("doc-1").unwrap();
    doc.conflict = Some(kn_core::Conflict {
        local: "mine".into(),
        remote: "theirs".into(),
        remote_clock: kn_core::VectorClock::from_iter([("node-b", 1)]),
        detected_at: h.store().now(),
    });
    doc.sync_status = SyncStatus::Conflict;
    h.store().put_synced_document(&doc).unwrap();
    let session = h.open("doc-1").await;

    session.handle_change("mine, edited").unwrap();
    session.save().unwrap();

    let stored = h.store().get_document("doc-1").unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Conflict);
    assert_eq!(stored.conflict.unwrap().local, "mine, edited");
    assert!(h.services.queue.list(None).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn saving_without_edits_is_a_no_op() {
    let h = Harness::new(true).await;
    h.seed("doc-1", "same");
    let session = h.open("doc-1").await;
    let before = h.store().get_document("doc-1").unwrap().version;

    session.save().unwrap();

    assert_eq!(h.store().get_document("doc-1").unwrap().version, before);
    assert!(h.services.queue.list(None).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn save_replaces_edits_when_store_changed_underneath() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "abc");
    let session = h.open("doc-1").await;

    let mut remote_edit = h.store().get_document("doc-1").unwrap();
    remote_edit.content = "xyz".into();
    remote_edit.mark_synced();
    h.store().put_synced_document(&remote_edit).unwrap();

    session.handle_insert(3, "d").unwrap();
    session.save().unwrap();

    let stored = h.store().get_document("doc-1").unwrap();
    assert_eq!(stored.content, "abcd");
    assert_eq!(stored.base_content, "xyz");
    assert_eq!(stored.local_changes.len(), 1);
    assert_eq!(stored.local_changes[0].kind, OpKind::Update);
    assert_eq!(
        kn_core::op::replay(&stored.base_content, &stored.local_changes).unwrap(),
        "abcd"
    );
}

#[yare::parameterized(
    offline = { false, 1_000 },
    online = { true, 3_000 },
)]
fn autosave_interval_follows_connectivity(online: bool, interval_ms: u64) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    runtime.block_on(async {
        let config = SyncConfig {
            save_debounce_ms: 600_000,
            ..SyncConfig::default()
        };
        let h = Harness::with_config(online, config).await;
        h.seed("doc-1", "");
        let session = h.open("doc-1").await;

        session.handle_insert(0, "x").unwrap();
        tokio::time::sleep(ms(interval_ms - 100)).await;
        assert!(session.get_save_status().has_unsaved_changes);

        tokio::time::sleep(ms(200)).await;
        assert!(!session.get_save_status().has_unsaved_changes);
        assert_eq!(h.store().get_document("doc-1").unwrap().content, "x");
    });
}

#[tokio::test(start_paused = true)]
async fn autosave_speeds_up_after_going_offline() {
    let config = SyncConfig {
        save_debounce_ms: 600_000,
        ..SyncConfig::default()
    };
    let h = Harness::with_config(true, config).await;
    h.seed("doc-1", "");
    let session = h.open("doc-1").await;

    // First tick is at 3s while online.
    tokio::time::sleep(ms(3_100)).await;
    h.go_offline().await;

    session.handle_insert(0, "x").unwrap();
    tokio::time::sleep(ms(1_100)).await;
    assert!(!session.get_save_status().has_unsaved_changes);
}

#[tokio::test(start_paused = true)]
async fn destroy_flushes_and_stops_timers() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "");
    let session = h.open("doc-1").await;

    session.handle_insert(0, "last words").unwrap();
    session.destroy().unwrap();
    assert_eq!(h.store().get_document("doc-1").unwrap().content, "last words");

    let version = h.store().get_document("doc-1").unwrap().version;
    tokio::time::sleep(ms(700_000)).await;
    assert_eq!(h.store().get_document("doc-1").unwrap().version, version);

    // Idempotent.
    session.destroy().unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_session_cancels_pending_save() {
    let h = Harness::debounce_only(false).await;
    h.seed("doc-1", "");
    let session = h.open("doc-1").await;

    session.handle_insert(0, "lost").unwrap();
    drop(session);
    tokio::time::sleep(ms(1_000)).await;

    assert_eq!(h.store().get_document("doc-1").unwrap().content, "");
}

#[tokio::test(start_paused = true)]
async fn failed_action_leaves_document_pending() {
    let h = Harness::debounce_only(true).await;
    h.seed("doc-1", "v1");
    h.authority
        .fail_next_delivery(crate::remote::RemoteError::Status {
            code: 403,
            message: "forbidden".into(),
        });
    let session = h.open("doc-1").await;

    session.handle_change("v2").unwrap();
    session.save().unwrap();
    h.services.queue.process().await;

    assert_eq!(
        h.services.queue.list(Some(ActionStatus::Failed)).unwrap().len(),
        1
    );
    assert_eq!(session.get_save_status().sync_status, SyncStatus::Pending);
}
