// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for one client's sync subsystem.
//!
//! A [`SyncContext`] owns the store, the connectivity monitor, the action
//! queue and the sync engine, and hands them to editing sessions. Without a
//! remote URL the context still opens: local edits persist, but the queue
//! and the engine stay inert.

use std::sync::Arc;
use std::time::Duration;

use kn_core::{ConnectivityState, LocalStore};
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, HttpProbe, NoRemoteProbe, Probe};
use crate::engine::{SyncEngine, SyncReport};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::queue::{ActionQueue, ProcessReport};
use crate::remote::{HttpRemote, Remote};
use crate::session::{EditingSession, SessionServices};

/// Workspace given to drafts created without a remote copy.
pub const DEFAULT_WORKSPACE: &str = "default";

/// What this context can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextCapabilities {
    /// False when the store fell back to memory.
    pub persistent: bool,
    /// False when no remote authority is configured.
    pub remote_configured: bool,
}

/// Builds a [`SyncContext`], optionally with injected collaborators.
pub struct SyncContextBuilder {
    node_id: String,
    store: LocalStore,
    config: SyncConfig,
    workspace_id: String,
    remote: Option<Arc<dyn Remote>>,
    probe: Option<Arc<dyn Probe>>,
}

impl SyncContextBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    /// Uses `remote` instead of an HTTP client built from the config.
    pub fn remote(mut self, remote: Arc<dyn Remote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Uses `probe` instead of the HTTP health probe.
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<SyncContext> {
        let config = self.config;
        config.validate()?;

        let remote = match self.remote {
            Some(remote) => Some(remote),
            None if config.remote.url.is_some() => {
                Some(Arc::new(HttpRemote::new(&config.remote)?) as Arc<dyn Remote>)
            }
            None => {
                error!("{}", Error::RemoteNotConfigured);
                None
            }
        };

        let probe_timeout = Duration::from_millis(config.probe_timeout_ms);
        let probe: Arc<dyn Probe> = match (self.probe, &remote) {
            (Some(probe), _) => probe,
            (None, None) => Arc::new(NoRemoteProbe),
            (None, Some(_)) => match HttpProbe::new(&config.remote, probe_timeout) {
                Some(probe) => Arc::new(probe),
                None => Arc::new(NoRemoteProbe),
            },
        };

        let store = Arc::new(self.store.with_quota(config.quota.clone()));
        let events = EventBus::new();
        let monitor = ConnectivityMonitor::new(probe, &config, events.clone());
        let queue = ActionQueue::new(
            store.clone(),
            remote.clone(),
            monitor.clone(),
            events.clone(),
            config.clone(),
        );
        let engine = SyncEngine::new(
            self.node_id.clone(),
            store.clone(),
            remote.clone(),
            monitor.clone(),
            events.clone(),
            config.clone(),
        );

        Ok(SyncContext {
            node_id: self.node_id,
            workspace_id: self.workspace_id,
            store,
            remote,
            monitor,
            queue,
            engine,
            events,
            config,
        })
    }
}

/// Owns every subsystem service for one client node.
pub struct SyncContext {
    node_id: String,
    workspace_id: String,
    store: Arc<LocalStore>,
    remote: Option<Arc<dyn Remote>>,
    monitor: ConnectivityMonitor,
    queue: ActionQueue,
    engine: SyncEngine,
    events: EventBus,
    config: SyncConfig,
}

impl SyncContext {
    pub fn builder(node_id: impl Into<String>, store: LocalStore) -> SyncContextBuilder {
        SyncContextBuilder {
            node_id: node_id.into(),
            store,
            config: SyncConfig::default(),
            workspace_id: DEFAULT_WORKSPACE.to_string(),
            remote: None,
            probe: None,
        }
    }

    /// Builds a context talking HTTP to the configured remote.
    pub fn from_config(
        node_id: impl Into<String>,
        store: LocalStore,
        config: SyncConfig,
    ) -> Result<Self> {
        Self::builder(node_id, store).config(config).build()
    }

    /// Measures connectivity and starts the background triggers.
    pub async fn start(&self) -> Result<ConnectivityState> {
        let state = self.monitor.start().await;
        self.queue.start()?;
        self.engine.start();
        info!(
            node = %self.node_id,
            state = %state,
            remote = self.remote.is_some(),
            "sync subsystem started"
        );
        Ok(state)
    }

    /// Opens and initializes an editing session.
    pub async fn open_session(&self, document_id: &str) -> Result<EditingSession> {
        let session = EditingSession::new(SessionServices {
            node_id: self.node_id.clone(),
            workspace_id: self.workspace_id.clone(),
            store: self.store.clone(),
            remote: self.remote.clone(),
            monitor: self.monitor.clone(),
            queue: self.queue.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        });
        session.initialize(document_id).await?;
        Ok(session)
    }

    /// Drains the queue then runs a sync cycle, for callers without the
    /// background triggers.
    pub async fn sync_now(&self) -> Result<(ProcessReport, SyncReport)> {
        if self.remote.is_none() {
            return Err(Error::RemoteNotConfigured);
        }
        if !self.monitor.refresh().await.is_reachable() {
            return Err(Error::Offline);
        }
        let processed = self.queue.process().await;
        let synced = self.engine.sync().await;
        Ok((processed, synced))
    }

    pub fn capabilities(&self) -> ContextCapabilities {
        ContextCapabilities {
            persistent: self.store.capabilities().persistent,
            remote_configured: self.remote.is_some(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stops every background task.
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.queue.shutdown();
        self.monitor.shutdown();
        info!(node = %self.node_id, "sync subsystem stopped");
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
