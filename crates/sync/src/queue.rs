// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable outbound action queue.
//!
//! Actions are persisted in the [`LocalStore`] before any delivery is
//! attempted, so a crash never loses one. Delivery is at-least-once:
//! - A run drains due actions sequentially in priority order
//! - Retryable failures go back to `pending` with exponential backoff
//! - Permanent failures and exhausted retries are marked `failed` and stay
//!   until retried or cleared by the user
//!
//! At most one processing run is active per queue; a concurrent
//! [`ActionQueue::process`] call joins the active run and observes its
//! report. Actions queued while a run is active make that run take another
//! pass before it finishes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kn_core::{
    ActionCounts, ActionPayload, ActionRequest, ActionStatus, LocalStore, QueuedAction, SyncStatus,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use crate::remote::Remote;

/// Outcome of one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Actions handed to the remote.
    pub attempted: usize,
    pub delivered: usize,
    /// Actions put back with a backoff.
    pub retried: usize,
    pub failed: usize,
    /// The run did nothing because the queue is offline or inert.
    pub skipped: bool,
}

impl ProcessReport {
    /// Adds the counts of a follow-up pass.
    fn absorb(&mut self, other: ProcessReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped = self.skipped && other.skipped;
    }
}

/// What happened to one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Retried,
    Failed,
    /// Shutdown interrupted the call; the action is pending again.
    Interrupted,
}

/// The active run, if any.
#[derive(Default)]
struct RunSlot {
    current: Option<watch::Receiver<Option<ProcessReport>>>,
    /// Set when actions became due after the active run read the queue.
    again: bool,
}

struct QueueInner {
    store: Arc<LocalStore>,
    remote: Option<Arc<dyn Remote>>,
    monitor: ConnectivityMonitor,
    events: EventBus,
    config: SyncConfig,
    cancel: CancellationToken,
    inflight: Mutex<RunSlot>,
}

/// Priority-ordered, durable queue of outbound mutations.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct ActionQueue {
    inner: Arc<QueueInner>,
}

impl ActionQueue {
    /// Creates a queue. Without a remote the queue persists actions but
    /// never delivers them.
    pub fn new(
        store: Arc<LocalStore>,
        remote: Option<Arc<dyn Remote>>,
        monitor: ConnectivityMonitor,
        events: EventBus,
        config: SyncConfig,
    ) -> Self {
        ActionQueue {
            inner: Arc::new(QueueInner {
                store,
                remote,
                monitor,
                events,
                config,
                cancel: CancellationToken::new(),
                inflight: Mutex::new(RunSlot::default()),
            }),
        }
    }

    /// Recovers interrupted actions and starts draining on every
    /// transition back online.
    pub fn start(&self) -> Result<()> {
        self.inner.store.reset_processing_actions()?;

        let queue = self.clone();
        let cancel = self.inner.cancel.clone();
        let mut rx = self.inner.monitor.subscribe();
        tokio::spawn(async move {
            let mut was_online = rx.borrow_and_update().is_reachable();
            if was_online {
                queue.process().await;
            }
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let online = rx.borrow_and_update().is_reachable();
                        if online && !was_online {
                            info!("back online, draining action queue");
                            queue.process().await;
                        }
                        was_online = online;
                    }
                }
            }
        });
        Ok(())
    }

    /// Persists an action and, when online, starts delivering it.
    pub fn enqueue(&self, request: ActionRequest) -> Result<QueuedAction> {
        let action = self.inner.store.enqueue_action(request)?;
        info!(
            action = %action.id,
            kind = %action.kind(),
            resource = %action.resource_id,
            priority = %action.priority,
            "action queued"
        );
        self.kick();
        Ok(action)
    }

    /// Starts a background run if one could make progress. An active run
    /// is asked to take another pass instead.
    fn kick(&self) {
        if self.inner.remote.is_none() || !self.inner.monitor.is_online() {
            return;
        }
        {
            let mut slot = self.inner.slot();
            if slot.current.is_some() {
                slot.again = true;
                return;
            }
        }
        let queue = self.clone();
        tokio::spawn(async move {
            queue.process().await;
        });
    }

    /// Delivers every due action, or joins the run already in flight.
    pub async fn process(&self) -> ProcessReport {
        let mut rx = {
            let mut slot = self.inner.slot();
            match slot.current.as_ref() {
                Some(rx) => {
                    debug!("joining in-flight queue run");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    slot.current = Some(rx.clone());
                    slot.again = false;
                    let queue = self.clone();
                    tokio::spawn(async move {
                        let report = queue.run_until_settled().await;
                        let _ = tx.send(Some(report));
                    });
                    rx
                }
            }
        };

        let report = rx
            .wait_for(Option::is_some)
            .await
            .map(|report| (*report).unwrap_or_default());
        report.unwrap_or_default()
    }

    /// Runs passes until nothing new became due during the last one, then
    /// releases the run slot.
    async fn run_until_settled(&self) -> ProcessReport {
        let mut report = self.run().await;
        loop {
            {
                // Checked under the slot lock so a concurrent kick either
                // sees the slot free or sets `again` before we look.
                let mut slot = self.inner.slot();
                if !slot.again || self.inner.cancel.is_cancelled() {
                    slot.current = None;
                    slot.again = false;
                    return report;
                }
                slot.again = false;
            }
            debug!("actions queued during the run, taking another pass");
            report.absorb(self.run().await);
        }
    }

    /// Runs a pass if online. For callers that drive the queue themselves.
    pub async fn tick(&self) -> ProcessReport {
        if !self.inner.monitor.is_online() {
            return ProcessReport {
                skipped: true,
                ..ProcessReport::default()
            };
        }
        self.process().await
    }

    async fn run(&self) -> ProcessReport {
        let mut report = ProcessReport::default();
        let Some(remote) = self.inner.remote.clone() else {
            debug!("no remote configured, queue is inert");
            report.skipped = true;
            return report;
        };
        if !self.inner.monitor.is_online() {
            debug!("offline, not processing actions");
            report.skipped = true;
            return report;
        }

        let store = &self.inner.store;
        let due = match store.due_actions(store.now()) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to read queued actions");
                return report;
            }
        };

        for action in due {
            if self.inner.cancel.is_cancelled() {
                break;
            }
            if !self.inner.monitor.is_online() {
                debug!("went offline, stopping queue run");
                break;
            }
            let id = action.id.clone();
            report.attempted += 1;
            match self.deliver(remote.as_ref(), action).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Retried) => report.retried += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Interrupted) => break,
                Err(e) => error!(action = %id, error = %e, "failed to record delivery outcome"),
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                "queue run finished"
            );
        }
        report
    }

    async fn deliver(&self, remote: &dyn Remote, mut action: QueuedAction) -> Result<Outcome> {
        let store = &self.inner.store;
        store.set_action_status(&action.id, ActionStatus::Processing)?;
        action.status = ActionStatus::Processing;

        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => {
                store.set_action_status(&action.id, ActionStatus::Pending)?;
                return Ok(Outcome::Interrupted);
            }
            result = remote.deliver(action.clone()) => result,
        };

        match result {
            Ok(()) => {
                store.delete_action(&action.id)?;
                self.apply_delivery(&action)?;
                debug!(action = %action.id, endpoint = %action.endpoint(), "action delivered");
                self.inner.events.emit(SyncEvent::ActionSucceeded {
                    action_id: action.id.clone(),
                    resource_id: action.resource_id.clone(),
                    kind: action.kind(),
                    resource_type: action.resource_type(),
                });
                Ok(Outcome::Delivered)
            }
            Err(e) if e.is_retryable() && action.retry_count < self.inner.config.max_retries => {
                action.retry_count += 1;
                let delay = self.inner.config.backoff_delay(action.retry_count);
                action.status = ActionStatus::Pending;
                action.next_attempt_at = Some(store.now() + to_chrono(delay));
                action.last_error = Some(e.to_string());
                store.update_action(&action)?;

                warn!(
                    action = %action.id,
                    retry = action.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "delivery failed, retry scheduled"
                );
                self.schedule_retry(delay);
                self.inner.events.emit(SyncEvent::ActionRetryScheduled {
                    action_id: action.id,
                    retry_count: action.retry_count,
                    delay,
                });
                Ok(Outcome::Retried)
            }
            Err(e) => {
                action.status = ActionStatus::Failed;
                action.next_attempt_at = None;
                action.last_error = Some(e.to_string());
                store.update_action(&action)?;

                error!(
                    action = %action.id,
                    retries = action.retry_count,
                    error = %e,
                    "action failed"
                );
                self.inner.events.emit(SyncEvent::ActionFailed {
                    action_id: action.id,
                    error: e.to_string(),
                });
                Ok(Outcome::Failed)
            }
        }
    }

    /// Local bookkeeping after the authority accepted an action.
    fn apply_delivery(&self, action: &QueuedAction) -> Result<()> {
        let store = &self.inner.store;
        match &action.payload {
            ActionPayload::CreateDocument { content, .. }
            | ActionPayload::UpdateDocument { content, .. } => {
                let Some(mut doc) = store.find_document(&action.resource_id)? else {
                    return Ok(());
                };
                // Newer edits made during delivery stay pending.
                if doc.content == *content && doc.sync_status == SyncStatus::Pending {
                    doc.mark_synced();
                    store.put_synced_document(&doc)?;
                }
            }
            ActionPayload::DeleteDocument => {
                store.delete_document(&action.resource_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn schedule_retry(&self, delay: Duration) {
        let queue = self.clone();
        let token = self.inner.cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if queue.inner.monitor.is_online() {
                        queue.kick();
                    } else {
                        debug!("offline at retry time, waiting for reconnect");
                    }
                }
            }
        });
    }

    /// Puts a failed action back in the queue with a fresh retry budget.
    pub fn retry(&self, action_id: &str) -> Result<QueuedAction> {
        let store = &self.inner.store;
        let mut action = store.get_action(action_id)?;
        if action.status != ActionStatus::Failed {
            return Err(kn_core::Error::InvalidAction(format!(
                "action {action_id} is {}, only failed actions can be retried",
                action.status
            ))
            .into());
        }
        action.retry_count = 0;
        action.status = ActionStatus::Pending;
        action.next_attempt_at = None;
        store.update_action(&action)?;
        info!(action = %action.id, "failed action requeued");
        self.kick();
        Ok(action)
    }

    /// Requeues every failed action. Returns how many were requeued.
    pub fn retry_all_failed(&self) -> Result<usize> {
        let store = &self.inner.store;
        let failed = store.list_actions(Some(ActionStatus::Failed))?;
        for mut action in failed.iter().cloned() {
            action.retry_count = 0;
            action.status = ActionStatus::Pending;
            action.next_attempt_at = None;
            store.update_action(&action)?;
        }
        if !failed.is_empty() {
            info!(count = failed.len(), "failed actions requeued");
            self.kick();
        }
        Ok(failed.len())
    }

    /// Drops every failed action. Returns how many were removed.
    pub fn clear_failed(&self) -> Result<usize> {
        let removed = self
            .inner
            .store
            .delete_actions_with_status(ActionStatus::Failed)?;
        if removed > 0 {
            info!(count = removed, "failed actions cleared");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<ActionCounts> {
        Ok(self.inner.store.action_counts()?)
    }

    /// Queued actions in delivery order.
    pub fn list(&self, status: Option<ActionStatus>) -> Result<Vec<QueuedAction>> {
        Ok(self.inner.store.list_actions(status)?)
    }

    /// True when the queue has a remote to deliver to.
    pub fn is_active(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// Stops the listener and cancels scheduled retries.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl QueueInner {
    fn slot(&self) -> std::sync::MutexGuard<'_, RunSlot> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
