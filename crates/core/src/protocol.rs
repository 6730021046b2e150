// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Messages exchanged with the remote authority during reconciliation.
//!
//! A sync cycle is a single round trip:
//! - Client sends its pending deltas and its client-wide vector clock
//! - Authority answers with every delta the client has not yet seen

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use crate::op::Operation;

/// Unit of change exchanged during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelta {
    pub document_id: String,
    /// Edits in origination order.
    pub operations: Vec<Operation>,
    /// Clock of the document after these operations.
    pub vector_clock: VectorClock,
    pub timestamp: DateTime<Utc>,
    /// Set when the delta creates the document on the receiving side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Sender's content after the operations, used when the receiver takes
    /// the remote copy wholesale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl SyncDelta {
    /// Creates a delta for a document.
    pub fn new(
        document_id: impl Into<String>,
        operations: Vec<Operation>,
        vector_clock: VectorClock,
        timestamp: DateTime<Utc>,
    ) -> Self {
        SyncDelta {
            document_id: document_id.into(),
            operations,
            vector_clock,
            timestamp,
            workspace_id: None,
            title: None,
            content: None,
        }
    }

    /// Attaches the document's workspace and title.
    pub fn with_document_info(mut self, workspace_id: &str, title: &str) -> Self {
        self.workspace_id = Some(workspace_id.to_string());
        self.title = Some(title.to_string());
        self
    }

    /// Attaches the sender's resulting content.
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    /// Sorts operations by origination time, keeping authoring order on ties.
    pub fn sort_operations(&mut self) {
        self.operations.sort_by_key(|op| op.timestamp);
    }
}

/// Body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub node_id: String,
    /// Client-wide clock; the authority returns deltas not dominated by it.
    pub vector_clock: VectorClock,
    pub changes: Vec<SyncDelta>,
}

/// Response to `POST /sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub changes: Vec<SyncDelta>,
}

/// Policy applied when a remote delta is concurrent with local changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// The later of local `last_modified` and remote timestamp wins outright.
    #[default]
    LastWriteWins,
    /// Transform local edits against remote edits and keep both.
    ThreeWayMerge,
    /// Hold both versions until the user decides.
    Manual,
}

impl ConflictStrategy {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last-write-wins",
            ConflictStrategy::ThreeWayMerge => "three-way-merge",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "last-write-wins" | "lww" => Ok(ConflictStrategy::LastWriteWins),
            "three-way-merge" | "merge" => Ok(ConflictStrategy::ThreeWayMerge),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(Error::InvalidConflictStrategy(s.to_string())),
        }
    }
}

/// Durable sync bookkeeping, one row per client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Merge of every document clock this client has seen.
    #[serde(default)]
    pub vector_clock: VectorClock,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

impl SyncMetadata {
    /// Fresh bookkeeping for a node that has never synced.
    pub fn new(node_id: impl Into<String>, conflict_strategy: ConflictStrategy) -> Self {
        SyncMetadata {
            node_id: node_id.into(),
            last_sync_time: None,
            vector_clock: VectorClock::new(),
            conflict_strategy,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
