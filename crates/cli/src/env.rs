// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! The variable name constants are generated by `build.rs` and live in the
//! [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `KN_CONFIG` if set.
pub fn config_path() -> Option<PathBuf> {
    non_empty(vars::KN_CONFIG).map(PathBuf::from)
}

/// Returns the value of `KN_STORE` if set.
pub fn store_path() -> Option<PathBuf> {
    non_empty(vars::KN_STORE).map(PathBuf::from)
}

/// Returns the value of `KN_NODE_ID` if set.
pub fn node_id() -> Option<String> {
    non_empty(vars::KN_NODE_ID)
}

/// Login name from `USER`, or `USERNAME` on Windows.
pub fn user() -> String {
    non_empty(vars::USER)
        .or_else(|| non_empty(vars::USERNAME))
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
