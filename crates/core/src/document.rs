// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client-local document copies and their sync bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use crate::op::Operation;
use crate::transform::transform_pair;

/// Edits kept per document for rebasing late concurrent edits.
pub const HISTORY_LIMIT: usize = 64;

/// Reconciliation state of a cached document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Matches the last state exchanged with the remote authority.
    Synced,
    /// Has local changes not yet reconciled.
    Pending,
    /// Holds two divergent versions awaiting a manual decision.
    Conflict,
}

impl SyncStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "conflict" => Ok(SyncStatus::Conflict),
            _ => Err(Error::InvalidSyncStatus(s.to_string())),
        }
    }
}

/// Both sides of an unresolved conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Local content at detection time.
    pub local: String,
    /// Remote content at detection time.
    pub remote: String,
    /// Clock of the remote version, merged in on resolution.
    pub remote_clock: VectorClock,
    pub detected_at: DateTime<Utc>,
}

/// Edits folded into a document's synced baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedEdits {
    /// Clock of the delta that carried the edits.
    pub vector_clock: VectorClock,
    /// The edits as applied to this copy.
    pub operations: Vec<Operation>,
}

/// Outcome chosen for a manually resolved conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep the local version.
    Local,
    /// Take the remote version.
    Remote,
    /// Use caller-provided merged content.
    Merged(String),
}

/// A client-local copy of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDocument {
    pub id: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    pub title: String,
    pub content: String,
    /// Content at the last synced point.
    #[serde(default)]
    pub base_content: String,
    pub version: i64,
    pub last_modified: DateTime<Utc>,
    pub sync_status: SyncStatus,
    /// Edits not yet reconciled, in authoring order.
    #[serde(default)]
    pub local_changes: Vec<Operation>,
    /// Causal history of this document's content.
    #[serde(default)]
    pub vector_clock: VectorClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
    /// Recent edits folded into `base_content`, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<AppliedEdits>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CachedDocument {
    /// Creates an empty synced draft.
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        CachedDocument {
            id: id.into(),
            workspace_id: workspace_id.into(),
            collection_id: None,
            title: String::new(),
            content: String::new(),
            base_content: String::new(),
            version: 0,
            last_modified: now,
            sync_status: SyncStatus::Synced,
            local_changes: Vec::new(),
            vector_clock: VectorClock::new(),
            conflict: None,
            history: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the content and synced baseline together.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self.base_content = self.content.clone();
        self
    }

    /// Returns true if there are unreconciled local edits.
    pub fn has_local_changes(&self) -> bool {
        !self.local_changes.is_empty()
    }

    /// Returns true while the document awaits a manual resolution.
    pub fn in_conflict(&self) -> bool {
        self.sync_status == SyncStatus::Conflict
    }

    /// Storage footprint used for quota accounting.
    pub fn size_bytes(&self) -> usize {
        self.content.len() + self.base_content.len() + self.title.len()
    }

    /// Appends local edits, applying them to the content.
    pub fn record_local(&mut self, ops: Vec<Operation>) -> Result<()> {
        for op in &ops {
            op.apply_to(&mut self.content)?;
        }
        self.local_changes.extend(ops);
        if self.sync_status == SyncStatus::Synced {
            self.sync_status = SyncStatus::Pending;
        }
        Ok(())
    }

    /// Marks the current content as reconciled.
    pub fn mark_synced(&mut self) {
        self.local_changes.clear();
        self.base_content = self.content.clone();
        self.conflict = None;
        self.sync_status = SyncStatus::Synced;
    }

    /// Remembers edits that became part of the baseline, dropping the
    /// oldest beyond [`HISTORY_LIMIT`].
    pub fn record_applied(&mut self, vector_clock: VectorClock, operations: Vec<Operation>) {
        if operations.is_empty() {
            return;
        }
        self.history.push(AppliedEdits {
            vector_clock,
            operations,
        });
        let excess = self.history.len().saturating_sub(HISTORY_LIMIT);
        self.history.drain(..excess);
    }

    /// Rewrites edits authored at `clock` so they apply on top of this
    /// copy's baseline.
    ///
    /// The edits are transformed over every recorded edit their author had
    /// not seen, oldest first. Edits from a clock that dominates the whole
    /// history come back unchanged.
    pub fn rebase(&self, clock: &VectorClock, operations: &[Operation]) -> Vec<Operation> {
        let mut ops = operations.to_vec();
        for applied in &self.history {
            if clock.dominates(&applied.vector_clock) {
                continue;
            }
            ops = transform_pair(&ops, &applied.operations).0;
        }
        ops
    }

    /// Enforces status invariants before the document is written.
    ///
    /// Non-empty local changes imply `pending` unless the document is
    /// held in conflict.
    pub fn normalize(&mut self) {
        if self.sync_status == SyncStatus::Conflict {
            return;
        }
        if self.has_local_changes() {
            self.sync_status = SyncStatus::Pending;
        }
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
