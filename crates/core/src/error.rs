// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for kn-core operations.

use thiserror::Error;

/// All possible errors that can occur in kn-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("invalid sync status: '{0}'\n  hint: valid statuses are: synced, pending, conflict")]
    InvalidSyncStatus(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid kinds are: insert, delete, update, format")]
    InvalidOpKind(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid action kind: '{0}'\n  hint: valid kinds are: create, update, delete, move, share")]
    InvalidActionKind(String),

    #[error("invalid resource type: '{0}'\n  hint: valid types are: document, collection, workspace, comment")]
    InvalidResourceType(String),

    #[error("invalid action status: '{0}'\n  hint: valid statuses are: pending, processing, failed")]
    InvalidActionStatus(String),

    #[error("invalid priority: '{0}'\n  hint: valid priorities are: critical, high, normal, low")]
    InvalidPriority(String),

    #[error("invalid conflict strategy: '{0}'\n  hint: valid strategies are: last-write-wins, three-way-merge, manual")]
    InvalidConflictStrategy(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("document {0} has no unresolved conflict")]
    NoConflict(String),

    #[error("storage quota exceeded for {collection}\n  hint: free space by clearing failed actions or cached media")]
    QuotaExceeded { collection: &'static str },

    #[error("incompatible snapshot version '{found}' (expected {expected}.x)")]
    IncompatibleSnapshot { found: String, expected: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl Error {
    /// Returns true if the error can be cleared by an eviction pass.
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::QuotaExceeded { .. })
    }
}

/// A specialized Result type for kn-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
