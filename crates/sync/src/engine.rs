// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Vector-clock reconciliation with the remote authority.
//!
//! A sync cycle is one `POST /sync` round trip:
//! 1. Every `pending` document becomes a [`SyncDelta`] stamped with a fresh
//!    tick of this node's counter
//! 2. The deltas go out together with the client-wide clock; the authority
//!    answers with every delta this client has not seen
//! 3. Each remote delta is applied, merged, or resolved under the
//!    configured [`ConflictStrategy`]
//! 4. Documents whose changes were delivered and reached a conflict-free
//!    state are marked `synced`, and [`SyncMetadata`] is written once
//!
//! A node's counter is shared by all documents it edits, so the
//! client-wide clock is enough for the authority to pick outstanding
//! deltas.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kn_core::op::replay;
use kn_core::transform::transform_pair;
use kn_core::{
    CachedDocument, CausalOrder, Conflict, ConflictChoice, ConflictStrategy, LocalStore,
    Operation, SyncDelta, SyncMetadata, SyncRequest, SyncStatus, VectorClock,
};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};
use crate::remote::Remote;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Local deltas sent.
    pub sent: usize,
    /// Remote deltas received.
    pub received: usize,
    /// Remote deltas that changed local content.
    pub applied: usize,
    /// Documents newly held for manual resolution.
    pub conflicts: usize,
    /// The cycle did not run because the engine is offline or inert.
    pub skipped: bool,
    /// Set when the cycle failed; local state is unchanged apart from
    /// clock ticks.
    pub error: Option<String>,
}

type InFlight = watch::Receiver<Option<SyncReport>>;

struct EngineInner {
    node_id: String,
    store: Arc<LocalStore>,
    remote: Option<Arc<dyn Remote>>,
    monitor: ConnectivityMonitor,
    events: EventBus,
    config: SyncConfig,
    cancel: CancellationToken,
    inflight: Mutex<Option<InFlight>>,
}

/// Reconciles local documents with the remote authority.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        node_id: impl Into<String>,
        store: Arc<LocalStore>,
        remote: Option<Arc<dyn Remote>>,
        monitor: ConnectivityMonitor,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        SyncEngine {
            inner: Arc::new(EngineInner {
                node_id: node_id.into(),
                store,
                remote,
                monitor,
                events,
                config,
                cancel: CancellationToken::new(),
                inflight: Mutex::new(None),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Runs a sync cycle, or joins the cycle already in flight.
    pub async fn sync(&self) -> SyncReport {
        let mut rx = {
            let mut slot = self.inner.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(rx) => {
                    debug!("joining in-flight sync cycle");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    let engine = self.clone();
                    tokio::spawn(async move {
                        let report = engine.run().await;
                        *engine.inner.inflight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        let _ = tx.send(Some(report));
                    });
                    rx
                }
            }
        };

        let report = rx
            .wait_for(Option::is_some)
            .await
            .map(|report| (*report).clone().unwrap_or_default());
        report.unwrap_or_default()
    }

    async fn run(&self) -> SyncReport {
        let Some(remote) = self.inner.remote.clone() else {
            debug!("no remote configured, sync engine is inert");
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        };
        if !self.inner.monitor.is_online() {
            debug!("offline, not syncing");
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        }

        debug!(node = %self.inner.node_id, "sync cycle started");
        match self.cycle(remote.as_ref()).await {
            Ok(report) => {
                info!(
                    sent = report.sent,
                    received = report.received,
                    applied = report.applied,
                    conflicts = report.conflicts,
                    "sync cycle finished"
                );
                self.inner.events.emit(SyncEvent::Synced {
                    sent: report.sent,
                    received: report.received,
                    conflicts: report.conflicts,
                });
                report
            }
            Err(e) => {
                warn!(error = %e, "sync cycle failed");
                self.inner.events.emit(SyncEvent::SyncError {
                    message: e.to_string(),
                });
                SyncReport {
                    error: Some(e.to_string()),
                    ..SyncReport::default()
                }
            }
        }
    }

    async fn cycle(&self, remote: &dyn Remote) -> Result<SyncReport> {
        let store = &self.inner.store;
        let node = self.inner.node_id.as_str();
        let strategy = self.inner.config.conflict_strategy;

        let mut meta = store
            .sync_metadata()?
            .unwrap_or_else(|| SyncMetadata::new(node, strategy));
        meta.node_id = node.to_string();
        meta.conflict_strategy = strategy;

        // Gather local deltas.
        let mut sent: BTreeMap<String, (usize, VectorClock)> = BTreeMap::new();
        let mut changes = Vec::new();
        for mut doc in store.pending_documents()? {
            if doc.local_changes.is_empty() {
                doc.local_changes
                    .push(Operation::update(doc.content.clone(), node, doc.last_modified));
            }
            meta.vector_clock.merge(&doc.vector_clock);
            let tick = meta.vector_clock.increment(node);
            doc.vector_clock.merge(&VectorClock::from_iter([(node, tick)]));
            store.put_synced_document(&doc)?;

            let mut delta = SyncDelta::new(
                doc.id.clone(),
                doc.local_changes.clone(),
                doc.vector_clock.clone(),
                doc.last_modified,
            )
            .with_document_info(&doc.workspace_id, &doc.title)
            .with_content(&doc.content);
            delta.sort_operations();
            sent.insert(
                doc.id.clone(),
                (doc.local_changes.len(), doc.vector_clock.clone()),
            );
            changes.push(delta);
        }

        let mut report = SyncReport {
            sent: changes.len(),
            ..SyncReport::default()
        };

        // Exchange.
        let request = SyncRequest {
            node_id: node.to_string(),
            vector_clock: meta.vector_clock.clone(),
            changes,
        };
        let response = tokio::select! {
            _ = self.inner.cancel.cancelled() => return Err(Error::Aborted),
            response = remote.exchange(request) => response?,
        };
        report.received = response.changes.len();

        // Apply remote deltas.
        let mut incoming = response.changes;
        incoming.sort_by_key(|delta| delta.timestamp);
        for delta in &incoming {
            meta.vector_clock.merge(&delta.vector_clock);
            match self.apply_remote(delta, strategy)? {
                Applied::Changed => report.applied += 1,
                Applied::Conflict => report.conflicts += 1,
                Applied::Unchanged => {}
            }
        }

        // Acknowledge delivered local changes.
        for (id, (count, clock)) in sent {
            self.acknowledge(&id, count, clock)?;
        }

        meta.last_sync_time = Some(store.now());
        store.put_sync_metadata(&meta)?;
        Ok(report)
    }

    fn apply_remote(&self, delta: &SyncDelta, strategy: ConflictStrategy) -> Result<Applied> {
        let store = &self.inner.store;
        let Some(mut doc) = store.find_document(&delta.document_id)? else {
            let content = match &delta.content {
                Some(content) => content.clone(),
                None => replay("", &delta.operations)?,
            };
            let mut doc = CachedDocument::new(
                delta.document_id.clone(),
                delta.workspace_id.clone().unwrap_or_default(),
                delta.timestamp,
            )
            .with_title(delta.title.clone().unwrap_or_default())
            .with_content(content);
            doc.vector_clock = delta.vector_clock.clone();
            store.put_synced_document(&doc)?;
            debug!(document = %doc.id, "materialized remote document");
            return Ok(Applied::Changed);
        };

        if doc.in_conflict() {
            debug!(document = %doc.id, "document awaits manual resolution, remote delta held back");
            return Ok(Applied::Unchanged);
        }

        let order = doc.vector_clock.compare(&delta.vector_clock);
        if matches!(order, CausalOrder::After | CausalOrder::Equal) {
            // Already reflected locally.
            doc.vector_clock.merge(&delta.vector_clock);
            store.put_synced_document(&doc)?;
            return Ok(Applied::Unchanged);
        }

        let outcome = if doc.sync_status == SyncStatus::Synced {
            let concurrent = order == CausalOrder::Concurrent;
            if concurrent && strategy == ConflictStrategy::LastWriteWins {
                if delta.timestamp > doc.last_modified {
                    self.take_remote(&mut doc, delta)?;
                    Applied::Changed
                } else {
                    debug!(document = %doc.id, "older concurrent remote edit ignored");
                    Applied::Unchanged
                }
            } else {
                let ops = doc.rebase(&delta.vector_clock, &delta.operations);
                if ops.is_empty() {
                    debug!(document = %doc.id, "remote edit superseded locally");
                    Applied::Unchanged
                } else {
                    doc.content = replay(&doc.content, &ops)?;
                    doc.record_applied(delta.vector_clock.clone(), ops);
                    doc.last_modified = doc.last_modified.max(delta.timestamp);
                    doc.mark_synced();
                    Applied::Changed
                }
            }
        } else {
            match strategy {
                ConflictStrategy::LastWriteWins => {
                    if delta.timestamp > doc.last_modified {
                        info!(document = %doc.id, "remote edit is later, local changes discarded");
                        self.take_remote(&mut doc, delta)?;
                        Applied::Changed
                    } else {
                        debug!(document = %doc.id, "local edit is later, keeping it");
                        Applied::Unchanged
                    }
                }
                ConflictStrategy::ThreeWayMerge => {
                    let remote_ops = doc.rebase(&delta.vector_clock, &delta.operations);
                    let remote_text = replay(&doc.base_content, &remote_ops)?;
                    let (local_ops, _) = transform_pair(&doc.local_changes, &remote_ops);
                    doc.content = replay(&remote_text, &local_ops)?;
                    let local_clock = doc.vector_clock.clone();
                    doc.record_applied(delta.vector_clock.clone(), remote_ops);
                    doc.record_applied(local_clock, local_ops);
                    doc.last_modified = doc.last_modified.max(delta.timestamp);
                    doc.mark_synced();
                    info!(document = %doc.id, "merged concurrent edits");
                    Applied::Changed
                }
                ConflictStrategy::Manual => {
                    let remote_content = match &delta.content {
                        Some(content) => content.clone(),
                        None => {
                            let ops = doc.rebase(&delta.vector_clock, &delta.operations);
                            replay(&doc.base_content, &ops)?
                        }
                    };
                    doc.conflict = Some(Conflict {
                        local: doc.content.clone(),
                        remote: remote_content,
                        remote_clock: delta.vector_clock.clone(),
                        detected_at: store.now(),
                    });
                    doc.sync_status = SyncStatus::Conflict;
                    store.put_synced_document(&doc)?;
                    warn!(document = %doc.id, "conflict held for manual resolution");
                    self.inner.events.emit(SyncEvent::Conflict {
                        document_id: doc.id.clone(),
                    });
                    return Ok(Applied::Conflict);
                }
            }
        };

        doc.vector_clock.merge(&delta.vector_clock);
        store.put_synced_document(&doc)?;
        Ok(outcome)
    }

    /// Replaces the local copy with the sender's version.
    fn take_remote(&self, doc: &mut CachedDocument, delta: &SyncDelta) -> Result<()> {
        let content = match &delta.content {
            Some(content) => content.clone(),
            None => {
                let ops = doc.rebase(&delta.vector_clock, &delta.operations);
                replay(&doc.base_content, &ops)?
            }
        };
        doc.record_applied(
            delta.vector_clock.clone(),
            vec![Operation::update(
                content.clone(),
                &self.inner.node_id,
                delta.timestamp,
            )],
        );
        doc.content = content;
        doc.last_modified = delta.timestamp;
        doc.mark_synced();
        Ok(())
    }

    /// Drops the first `count` local changes, which the authority now holds
    /// under `clock`.
    fn acknowledge(&self, id: &str, count: usize, clock: VectorClock) -> Result<()> {
        let store = &self.inner.store;
        let Some(mut doc) = store.find_document(id)? else {
            return Ok(());
        };
        // Synced by a remote win or merge, or held in conflict.
        if doc.sync_status != SyncStatus::Pending {
            return Ok(());
        }
        let count = count.min(doc.local_changes.len());
        let delivered: Vec<Operation> = doc.local_changes.drain(..count).collect();
        doc.base_content = replay(&doc.base_content, &delivered)?;
        doc.record_applied(clock, delivered);
        if doc.local_changes.is_empty() {
            doc.mark_synced();
        }
        store.put_synced_document(&doc)?;
        Ok(())
    }

    /// Settles a conflict with the user's choice.
    ///
    /// The document returns to `pending` with a whole-content update, so the
    /// next cycle propagates the decision.
    pub fn resolve_conflict_manually(
        &self,
        document_id: &str,
        choice: ConflictChoice,
    ) -> Result<CachedDocument> {
        let store = &self.inner.store;
        let mut doc = store.get_document(document_id)?;
        let Some(conflict) = doc.conflict.take() else {
            return Err(kn_core::Error::NoConflict(document_id.to_string()).into());
        };

        // Edits made while the conflict was held live in the content.
        let content = match choice {
            ConflictChoice::Local => doc.content.clone(),
            ConflictChoice::Remote => conflict.remote.clone(),
            ConflictChoice::Merged(content) => content,
        };
        doc.record_applied(
            conflict.remote_clock.clone(),
            vec![Operation::update(
                conflict.remote.clone(),
                &self.inner.node_id,
                conflict.detected_at,
            )],
        );
        doc.vector_clock.merge(&conflict.remote_clock);
        doc.base_content = conflict.remote;
        doc.content = content.clone();
        doc.local_changes = vec![Operation::update(content, &self.inner.node_id, store.now())];
        doc.sync_status = SyncStatus::Pending;

        let doc = store.put_document(&doc)?;
        info!(document = %doc.id, "conflict resolved");
        Ok(doc)
    }

    /// Starts the triggers: back online, the periodic timer, and a short
    /// debounce after each delivered action.
    pub fn start(&self) {
        let engine = self.clone();
        tokio::spawn(async move { engine.run_triggers().await });
    }

    async fn run_triggers(self) {
        let cancel = self.inner.cancel.clone();
        let mut connectivity = self.inner.monitor.subscribe();
        let mut events = self.inner.events.subscribe();
        let period = Duration::from_millis(self.inner.config.periodic_sync_interval_ms);
        let debounce = Duration::from_millis(self.inner.config.sync_debounce_ms);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut was_online = connectivity.borrow_and_update().is_reachable();
        if was_online {
            self.sync().await;
        }
        let mut deadline: Option<Instant> = None;

        loop {
            let pending = deadline;
            let debounced = async move {
                match pending {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let online = connectivity.borrow_and_update().is_reachable();
                    if online && !was_online {
                        info!("back online, syncing");
                        self.sync().await;
                    }
                    was_online = online;
                }
                _ = ticker.tick() => {
                    if self.inner.monitor.is_online() {
                        debug!("periodic sync");
                        self.sync().await;
                    }
                }
                event = events.recv() => match event {
                    Some(SyncEvent::ActionSucceeded { .. }) => {
                        deadline = Some(Instant::now() + debounce);
                    }
                    Some(_) => {}
                    None => return,
                },
                _ = debounced => {
                    deadline = None;
                    if self.inner.monitor.is_online() {
                        debug!("syncing after delivered actions");
                        self.sync().await;
                    }
                }
            }
        }
    }

    /// Stops the triggers and aborts an exchange in flight.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

/// Effect of one remote delta on the local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Changed,
    Unchanged,
    Conflict,
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
