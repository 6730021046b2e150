// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles for the sync subsystem.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kn_core::op::replay;
use kn_core::{ActionPayload, QueuedAction, SyncDelta, SyncRequest, SyncResponse};

use crate::connectivity::{Measurement, Probe};
use crate::remote::{Remote, RemoteDocument, RemoteError, RemoteFuture};

/// A probe whose answer is set by the test.
#[derive(Default)]
pub struct ScriptedProbe {
    measurement: Mutex<Measurement>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn online() -> Arc<Self> {
        let probe = Arc::new(ScriptedProbe::default());
        probe.set_online();
        probe
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(ScriptedProbe::default())
    }

    pub fn set(&self, measurement: Measurement) {
        *self.measurement.lock().unwrap_or_else(|e| e.into_inner()) = measurement;
    }

    pub fn set_online(&self) {
        self.set(Measurement::reachable(Duration::from_millis(20)));
    }

    pub fn set_offline(&self) {
        self.set(Measurement::unreachable());
    }

    /// Makes every measurement take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Probe for ScriptedProbe {
    fn measure(&self) -> Pin<Box<dyn Future<Output = Measurement> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            *self.measurement.lock().unwrap_or_else(|e| e.into_inner())
        })
    }
}

#[derive(Default)]
struct AuthorityState {
    attempts: usize,
    delivered: Vec<QueuedAction>,
    delivery_failures: VecDeque<RemoteError>,
    exchange_failures: VecDeque<RemoteError>,
    /// Every delta received, tagged with the sending node.
    deltas: Vec<(String, SyncDelta)>,
    documents: HashMap<String, RemoteDocument>,
    exchanges: Vec<SyncRequest>,
}

/// An in-memory remote authority.
///
/// `/sync` stores incoming deltas and answers with every delta from other
/// nodes that the caller's clock does not already dominate.
#[derive(Default)]
pub struct MemoryAuthority {
    state: Mutex<AuthorityState>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryAuthority::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthorityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// The next delivery fails with `error`; calls queue up.
    pub fn fail_next_delivery(&self, error: RemoteError) {
        self.lock().delivery_failures.push_back(error);
    }

    pub fn fail_next_exchange(&self, error: RemoteError) {
        self.lock().exchange_failures.push_back(error);
    }

    pub fn put_document(&self, doc: RemoteDocument) {
        self.lock().documents.insert(doc.id.clone(), doc);
    }

    pub fn document(&self, id: &str) -> Option<RemoteDocument> {
        self.lock().documents.get(id).cloned()
    }

    /// Records a delta as if `node` had sent it.
    pub fn seed_delta(&self, node: &str, delta: SyncDelta) {
        self.lock().deltas.push((node.to_string(), delta));
    }

    /// Actions delivered successfully, in order.
    pub fn delivered(&self) -> Vec<QueuedAction> {
        self.lock().delivered.clone()
    }

    /// Number of delivery attempts including failures.
    pub fn delivery_attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn exchanges(&self) -> Vec<SyncRequest> {
        self.lock().exchanges.clone()
    }

    pub fn deltas(&self) -> Vec<SyncDelta> {
        self.lock().deltas.iter().map(|(_, d)| d.clone()).collect()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Remote for MemoryAuthority {
    fn deliver(&self, action: QueuedAction) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.attempts += 1;
            if let Some(error) = state.delivery_failures.pop_front() {
                return Err(error);
            }
            match &action.payload {
                ActionPayload::UpdateDocument { content, .. } => {
                    if let Some(doc) = state.documents.get_mut(&action.resource_id) {
                        doc.content = content.clone();
                    }
                }
                ActionPayload::DeleteDocument => {
                    state.documents.remove(&action.resource_id);
                }
                _ => {}
            }
            state.delivered.push(action);
            Ok(())
        })
    }

    fn exchange(&self, request: SyncRequest) -> RemoteFuture<'_, SyncResponse> {
        Box::pin(async move {
            self.pause().await;
            let mut state = self.lock();
            state.exchanges.push(request.clone());
            if let Some(error) = state.exchange_failures.pop_front() {
                return Err(error);
            }

            let changes = state
                .deltas
                .iter()
                .filter(|(node, delta)| {
                    *node != request.node_id && !request.vector_clock.dominates(&delta.vector_clock)
                })
                .map(|(_, delta)| delta.clone())
                .collect();

            for delta in request.changes {
                if let Some(doc) = state.documents.get_mut(&delta.document_id) {
                    if let Ok(content) = replay(&doc.content, &delta.operations) {
                        doc.content = content;
                    }
                    doc.vector_clock.merge(&delta.vector_clock);
                }
                state.deltas.push((request.node_id.clone(), delta));
            }
            Ok(SyncResponse { changes })
        })
    }

    fn fetch_document(&self, id: &str) -> RemoteFuture<'_, Option<RemoteDocument>> {
        let id = id.to_string();
        Box::pin(async move {
            self.pause().await;
            Ok(self.lock().documents.get(&id).cloned())
        })
    }
}
