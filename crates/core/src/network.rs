// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network condition as seen by the connectivity monitor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current network condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    /// Reachable with acceptable quality.
    Online,
    /// Remote authority unreachable.
    Offline,
    /// Reachable, but bandwidth or latency is poor.
    Slow,
    /// Reachable, but the platform asked to save data.
    Limited,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "ONLINE",
            ConnectivityState::Offline => "OFFLINE",
            ConnectivityState::Slow => "SLOW",
            ConnectivityState::Limited => "LIMITED",
        }
    }

    /// Returns true when the remote authority can be reached at all.
    ///
    /// Slow and limited networks still carry traffic.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ConnectivityState::Offline)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
