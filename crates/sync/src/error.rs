// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for kn-sync operations.

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced by the sync subsystem.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] kn_core::Error),

    #[error("no remote authority configured\n  hint: set remote.url in the config file")]
    RemoteNotConfigured,

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("editing session not ready: {0}")]
    SessionNotReady(String),

    #[error("operation aborted")]
    Aborted,

    #[error("offline: the remote authority is unreachable\n  hint: local changes are kept and sent once it is reachable")]
    Offline,
}

impl Error {
    /// Returns true for errors a later attempt may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_retryable(),
            Error::Offline => true,
            _ => false,
        }
    }
}

/// A specialized Result type for kn-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
