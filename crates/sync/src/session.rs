// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-document editing sessions.
//!
//! An [`EditingSession`] turns editor operations into local-store writes.
//! Edits mutate an in-memory buffer and are saved after a short quiet
//! period; an autosave timer catches anything the debounce missed, more
//! often while offline. Each save marks the document `pending` and, when
//! online, queues a whole-content update for the remote authority.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kn_core::op::slice_chars;
use kn_core::{
    ActionPayload, ActionRequest, CachedDocument, LocalStore, Operation, SyncStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};
use crate::queue::ActionQueue;
use crate::remote::Remote;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Destroyed,
}

/// What an editor shows next to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveStatus {
    pub has_unsaved_changes: bool,
    pub last_saved: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

/// Services a session works with.
#[derive(Clone)]
pub struct SessionServices {
    pub node_id: String,
    pub workspace_id: String,
    pub store: Arc<LocalStore>,
    pub remote: Option<Arc<dyn Remote>>,
    pub monitor: ConnectivityMonitor,
    pub queue: ActionQueue,
    pub events: EventBus,
    pub config: SyncConfig,
}

struct SessionData {
    state: SessionState,
    doc: Option<CachedDocument>,
    /// Edits since the last save, in order.
    pending_ops: Vec<Operation>,
    /// Content as last loaded or written.
    saved_content: String,
    last_saved: Option<DateTime<Utc>>,
    save_timer: Option<CancellationToken>,
}

struct SessionInner {
    services: SessionServices,
    data: Mutex<SessionData>,
    cancel: CancellationToken,
}

/// Editing session for one document. Dropping it cancels its timers.
pub struct EditingSession {
    inner: Arc<SessionInner>,
}

impl EditingSession {
    pub fn new(services: SessionServices) -> Self {
        EditingSession {
            inner: Arc::new(SessionInner {
                services,
                data: Mutex::new(SessionData {
                    state: SessionState::Uninitialized,
                    doc: None,
                    pending_ops: Vec::new(),
                    saved_content: String::new(),
                    last_saved: None,
                    save_timer: None,
                }),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Loads the document and starts autosave.
    ///
    /// Order of preference: the local store, the remote authority when
    /// online, then an empty draft that is persisted on first save.
    pub async fn initialize(&self, document_id: &str) -> Result<()> {
        if self.inner.lock().state != SessionState::Uninitialized {
            return Err(Error::SessionNotReady(format!(
                "session for {document_id} was already initialized"
            )));
        }

        let services = &self.inner.services;
        let doc = match services.store.find_document(document_id)? {
            Some(doc) => doc,
            None => match self.fetch_remote(document_id).await {
                Some(doc) => doc,
                None => {
                    debug!(document = %document_id, "starting empty draft");
                    CachedDocument::new(
                        document_id,
                        services.workspace_id.clone(),
                        services.store.now(),
                    )
                }
            },
        };

        {
            let mut data = self.inner.lock();
            data.saved_content = doc.content.clone();
            data.doc = Some(doc);
            data.state = SessionState::Ready;
        }
        services.events.emit(SyncEvent::Initialized {
            document_id: document_id.to_string(),
        });
        self.start_autosave();
        info!(document = %document_id, "editing session ready");
        Ok(())
    }

    async fn fetch_remote(&self, document_id: &str) -> Option<CachedDocument> {
        let services = &self.inner.services;
        let remote = services.remote.as_ref()?;
        if !services.monitor.is_online() {
            return None;
        }
        match remote.fetch_document(document_id).await {
            Ok(Some(remote_doc)) => {
                let doc = remote_doc.into_cached(services.store.now());
                match services.store.put_synced_document(&doc) {
                    Ok(doc) => Some(doc),
                    Err(e) => {
                        warn!(document = %document_id, error = %e, "failed to cache fetched document");
                        Some(doc)
                    }
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(document = %document_id, error = %e, "failed to fetch document");
                None
            }
        }
    }

    /// Saves unsaved edits on a timer that restarts whenever connectivity
    /// changes, so going offline shortens the wait right away.
    fn start_autosave(&self) {
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let mut connectivity = self.inner.services.monitor.subscribe();
        tokio::spawn(async move {
            loop {
                let interval = match weak.upgrade() {
                    Some(inner) => inner
                        .services
                        .config
                        .autosave_interval(inner.services.monitor.is_online()),
                    None => return,
                };
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        let Some(inner) = weak.upgrade() else { return };
                        if let Err(e) = inner.save() {
                            warn!(error = %e, "autosave failed");
                        }
                    }
                }
            }
        });
    }

    /// Inserts `text` at character `position`.
    pub fn handle_insert(&self, position: usize, text: &str) -> Result<Operation> {
        let op = Operation::insert(
            position,
            text,
            &self.inner.services.node_id,
            self.inner.services.store.now(),
        );
        self.apply(op)
    }

    /// Deletes `length` characters at `position`.
    pub fn handle_delete(&self, position: usize, length: usize) -> Result<Operation> {
        let removed = {
            let data = self.inner.lock();
            let doc = ready_doc(&data)?;
            slice_chars(&doc.content, position, length)
        };
        let op = Operation::delete(
            position,
            removed,
            &self.inner.services.node_id,
            self.inner.services.store.now(),
        );
        self.apply(op)
    }

    /// Replaces the whole content.
    pub fn handle_change(&self, content: &str) -> Result<Operation> {
        let op = Operation::update(
            content,
            &self.inner.services.node_id,
            self.inner.services.store.now(),
        );
        self.apply(op)
    }

    /// Applies formatting attributes to a range.
    pub fn handle_format(
        &self,
        position: usize,
        length: usize,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Result<Operation> {
        let op = Operation::format(
            position,
            length,
            attributes,
            &self.inner.services.node_id,
            self.inner.services.store.now(),
        );
        self.apply(op)
    }

    fn apply(&self, op: Operation) -> Result<Operation> {
        let document_id = {
            let mut data = self.inner.lock();
            let doc = ready_doc_mut(&mut data)?;
            op.apply_to(&mut doc.content)?;
            let id = doc.id.clone();
            data.pending_ops.push(op.clone());
            id
        };
        self.inner.services.events.emit(SyncEvent::Change {
            document_id,
            operation: op.clone(),
        });
        self.schedule_save();
        Ok(op)
    }

    /// Restarts the save debounce.
    fn schedule_save(&self) {
        let token = self.inner.cancel.child_token();
        if let Some(previous) = self.inner.lock().save_timer.replace(token.clone()) {
            previous.cancel();
        }
        let weak = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.services.config.save_debounce_ms);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let Some(inner) = weak.upgrade() else { return };
                    if let Err(e) = inner.save() {
                        warn!(error = %e, "debounced save failed");
                    }
                }
            }
        });
    }

    /// Persists unsaved edits now.
    pub fn save(&self) -> Result<()> {
        self.inner.save()
    }

    pub fn get_save_status(&self) -> SaveStatus {
        let data = self.inner.lock();
        let id = data.doc.as_ref().map(|d| d.id.clone());
        let fallback = data
            .doc
            .as_ref()
            .map(|d| d.sync_status)
            .unwrap_or(SyncStatus::Synced);
        let status = SaveStatus {
            has_unsaved_changes: !data.pending_ops.is_empty(),
            last_saved: data.last_saved,
            sync_status: fallback,
        };
        drop(data);

        // The queue and engine update the stored status after delivery.
        let stored = id.and_then(|id| self.inner.services.store.find_document(&id).ok().flatten());
        match stored {
            Some(doc) => SaveStatus {
                sync_status: doc.sync_status,
                ..status
            },
            None => status,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Current in-memory content.
    pub fn content(&self) -> Option<String> {
        self.inner.lock().doc.as_ref().map(|d| d.content.clone())
    }

    pub fn document_id(&self) -> Option<String> {
        self.inner.lock().doc.as_ref().map(|d| d.id.clone())
    }

    /// Flushes unsaved edits and cancels all timers.
    pub fn destroy(&self) -> Result<()> {
        let result = if self.state() == SessionState::Ready {
            self.inner.save()
        } else {
            Ok(())
        };
        self.inner.cancel.cancel();
        let mut data = self.inner.lock();
        data.save_timer = None;
        data.state = SessionState::Destroyed;
        result
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self) -> Result<()> {
        let services = &self.services;
        let (doc, ops, saved_content) = {
            let mut data = self.lock();
            if data.state != SessionState::Ready || data.pending_ops.is_empty() {
                return Ok(());
            }
            if let Some(timer) = data.save_timer.take() {
                timer.cancel();
            }
            let doc = ready_doc(&data)?.clone();
            let ops = std::mem::take(&mut data.pending_ops);
            (doc, ops, data.saved_content.clone())
        };

        let written = match self.write(&doc, &ops, &saved_content) {
            Ok(written) => written,
            Err(e) => {
                // Keep the edits for the next attempt.
                let mut data = self.lock();
                data.pending_ops.splice(0..0, ops);
                return Err(e);
            }
        };

        {
            let mut data = self.lock();
            data.saved_content = written.content.clone();
            data.last_saved = Some(written.last_modified);
            if let Some(current) = data.doc.as_mut() {
                current.version = written.version;
                current.sync_status = written.sync_status;
                current.last_modified = written.last_modified;
            }
        }
        debug!(document = %written.id, version = written.version, "document saved");
        services.events.emit(SyncEvent::Saved {
            document_id: written.id.clone(),
            version: written.version,
        });

        if written.in_conflict() {
            debug!(document = %written.id, "held in conflict, update waits for resolution");
        } else if services.monitor.is_online() && services.queue.is_active() {
            let request = ActionRequest::new(
                written.id.clone(),
                ActionPayload::UpdateDocument {
                    content: written.content.clone(),
                    title: None,
                },
            );
            if let Err(e) = services.queue.enqueue(request) {
                warn!(document = %written.id, error = %e, "failed to queue update");
            }
        }
        Ok(())
    }

    /// Writes the session's content and edits over the stored bookkeeping.
    fn write(
        &self,
        doc: &CachedDocument,
        ops: &[Operation],
        saved_content: &str,
    ) -> Result<CachedDocument> {
        let store = &self.services.store;
        let mut record = match store.find_document(&doc.id)? {
            Some(stored) => {
                let mut record = stored;
                if record.content != saved_content {
                    // Changed underneath us; the edits no longer line up.
                    record.local_changes.push(Operation::update(
                        doc.content.clone(),
                        &self.services.node_id,
                        store.now(),
                    ));
                } else {
                    record.local_changes.extend_from_slice(ops);
                }
                record.content = doc.content.clone();
                record.title = doc.title.clone();
                if let Some(conflict) = record.conflict.as_mut() {
                    conflict.local = record.content.clone();
                }
                record
            }
            None => {
                let mut record = doc.clone();
                record.local_changes = ops.to_vec();
                record
            }
        };
        if record.sync_status == SyncStatus::Synced {
            record.sync_status = SyncStatus::Pending;
        }
        Ok(store.put_document(&record)?)
    }
}

fn ready_doc(data: &SessionData) -> Result<&CachedDocument> {
    match (data.state, data.doc.as_ref()) {
        (SessionState::Ready, Some(doc)) => Ok(doc),
        (state, _) => Err(Error::SessionNotReady(format!("session is {state:?}"))),
    }
}

fn ready_doc_mut(data: &mut SessionData) -> Result<&mut CachedDocument> {
    match (data.state, data.doc.as_mut()) {
        (SessionState::Ready, Some(doc)) => Ok(doc),
        (state, _) => Err(Error::SessionNotReady(format!("session is {state:?}"))),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
