// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by the `kn` command line.
///
/// Store and sync errors pass through with their own messages and hints.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] kn_core::Error),

    #[error(transparent)]
    Sync(kn_sync::Error),

    #[error("invalid config file {}: {message}\n  hint: check the TOML syntax", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("no data directory found\n  hint: pass --store or set KN_STORE")]
    NoDataDir,

    #[error("invalid edit: {0}\n  hint: use one of --set, --insert or --delete")]
    InvalidEdit(String),

    #[error("sync failed: {0}\n  hint: queued changes are kept and retried on the next sync")]
    SyncFailed(String),

    #[error("preference not found: {0}")]
    PreferenceNotFound(String),

    #[error("export path cannot be empty")]
    ExportPathEmpty,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for kn command operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<kn_sync::Error> for Error {
    fn from(e: kn_sync::Error) -> Self {
        match e {
            kn_sync::Error::Core(e) => Error::Core(e),
            other => Error::Sync(other),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
