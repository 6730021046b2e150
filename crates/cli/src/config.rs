// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Read from `$XDG_CONFIG_HOME/kn/config.toml` unless `--config` or
//! `KN_CONFIG` names another file. A missing file means defaults. The sync
//! options sit at the top level next to the client's own keys:
//!
//! ```toml
//! node_id = "laptop"
//! workspace = "ws-1"
//! conflict_strategy = "manual"
//!
//! [remote]
//! url = "https://kn.example.com"
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use kn_sync::SyncConfig;

use crate::env;
use crate::error::{Error, Result};

const APP_DIR_NAME: &str = "kn";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity of this client in vector clocks. Derived when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Workspace for documents created here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Database path; defaults to the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
    #[serde(flatten)]
    pub sync: SyncConfig,
}

impl Config {
    /// Loads `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Loads the file named by the flag, `KN_CONFIG`, or the default path.
    pub fn discover(flag: Option<&Path>) -> Result<Self> {
        let path = flag
            .map(Path::to_path_buf)
            .or_else(env::config_path)
            .or_else(default_config_path);
        match path {
            Some(path) => Self::load(&path),
            None => Ok(Config::default()),
        }
    }

    /// `KN_NODE_ID`, then the file, then a stable hash of this machine.
    pub fn node_id(&self) -> String {
        env::node_id()
            .or_else(|| self.node_id.clone())
            .unwrap_or_else(|| {
                let data_dir = dirs::data_dir().unwrap_or_default();
                derive_node_id(&data_dir, &env::user())
            })
    }

    /// `--store`, then `KN_STORE`, then the file, then
    /// `$XDG_DATA_HOME/kn/<node>.db`.
    pub fn store_path(&self, node_id: &str, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = flag.map(Path::to_path_buf).or_else(env::store_path) {
            return Ok(path);
        }
        if let Some(path) = &self.store {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join(format!("{node_id}.db")))
            .ok_or(Error::NoDataDir)
    }
}

/// `$XDG_CONFIG_HOME/kn/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Node ID from the data directory and login name.
pub fn derive_node_id(data_dir: &Path, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data_dir.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    hasher.update(user.as_bytes());
    let result = hasher.finalize();
    format!("node-{}", hex::encode(&result[..8]))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
