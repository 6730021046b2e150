// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! kn-core: Shared library for the kn offline-first sync subsystem
//!
//! This crate provides the data model, the durable local store, and the
//! pure algorithms (vector clocks, operation replay, operational transform)
//! used by kn-sync and the kn CLI.

pub mod action;
pub mod clock;
pub mod document;
pub mod error;
pub mod network;
pub mod op;
pub mod protocol;
pub mod snapshot;
pub mod store;
pub mod transform;

pub use action::{
    ActionKind, ActionPayload, ActionRequest, ActionStatus, Endpoint, HttpMethod, Priority,
    QueuedAction, ResourceType, SharePermission,
};
pub use clock::{CausalOrder, ClockSource, ManualClock, SystemClock, VectorClock};
pub use document::{AppliedEdits, CachedDocument, Conflict, ConflictChoice, SyncStatus, HISTORY_LIMIT};
pub use error::{Error, Result};
pub use network::ConnectivityState;
pub use op::{OpKind, Operation};
pub use protocol::{ConflictStrategy, SyncDelta, SyncMetadata, SyncRequest, SyncResponse};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use store::{ActionCounts, Capabilities, EvictionReport, LocalStore, Quota};
