// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! kn-sync: the async half of the kn offline-first sync subsystem
//!
//! Builds on the kn-core store and algorithms:
//! - `connectivity`: reachability state machine driven by a probe
//! - `queue`: durable action queue with retry and backoff
//! - `engine`: vector-clock delta exchange and conflict strategies
//! - `session`: per-document editing with debounced saves
//! - `context`: wires the above for one client node

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod queue;
pub mod remote;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use clock::RuntimeClock;
pub use config::{RemoteConfig, SyncConfig};
pub use connectivity::{
    classify, ConnectivityMonitor, HttpProbe, Measurement, NetworkChange, NoRemoteProbe, Probe,
    Thresholds,
};
pub use context::{ContextCapabilities, SyncContext, SyncContextBuilder, DEFAULT_WORKSPACE};
pub use engine::{SyncEngine, SyncReport};
pub use error::{Error, Result};
pub use events::{EventBus, Subscription, SyncEvent};
pub use queue::{ActionQueue, ProcessReport};
pub use remote::{HttpRemote, Remote, RemoteDocument, RemoteError, RemoteFuture, RemoteResult};
pub use session::{EditingSession, SaveStatus, SessionServices, SessionState};
