// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;

/// A client with its own config and store in a temp directory.
pub struct Client {
    pub dir: TempDir,
}

impl Client {
    /// A client with no remote configured.
    pub fn offline() -> Self {
        Client {
            dir: TempDir::new().unwrap(),
        }
    }

    /// A client whose remote URL points at a closed port.
    pub fn unreachable_remote() -> Self {
        let client = Self::offline();
        std::fs::write(
            client.config_path(),
            "probe_timeout_ms = 500\n\n[remote]\nurl = \"http://127.0.0.1:9\"\nrequest_timeout_ms = 500\n",
        )
        .unwrap();
        client
    }

    pub fn config_path(&self) -> std::path::PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn store_path(&self) -> std::path::PathBuf {
        self.dir.path().join("kn.db")
    }

    pub fn kn(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("kn");
        cmd.arg("--config")
            .arg(self.config_path())
            .arg("--store")
            .arg(self.store_path())
            .env("KN_NODE_ID", "node-test")
            .env_remove("KN_LOG")
            .env_remove("KN_STORE")
            .env_remove("KN_CONFIG");
        cmd
    }
}
