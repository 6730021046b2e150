// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync subsystem configuration.
//!
//! Every field has a default, so an empty TOML table yields a working
//! configuration. Durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use kn_core::{ConflictStrategy, Quota};

use crate::error::{Error, Result};

/// Options recognised by the sync subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Attempts allowed for a retryable action before it is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Interval between sync cycles while online.
    #[serde(default = "default_periodic_sync_interval_ms")]
    pub periodic_sync_interval_ms: u64,
    #[serde(default = "default_autosave_offline_ms")]
    pub autosave_offline_ms: u64,
    #[serde(default = "default_autosave_online_ms")]
    pub autosave_online_ms: u64,
    /// Quiet period after an edit before the session saves.
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    /// Quiet period after an action succeeds before a sync cycle starts.
    #[serde(default = "default_sync_debounce_ms")]
    pub sync_debounce_ms: u64,
    #[serde(default = "default_quality_check_interval_ms")]
    pub quality_check_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_slow_latency_ms")]
    pub slow_latency_ms: u64,
    #[serde(default = "default_slow_bandwidth_mbps")]
    pub slow_bandwidth_mbps: f64,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub quota: Quota,
}

/// Where the remote authority lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://api.example.com`. Absent means local-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Path probed for reachability (HEAD request).
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_periodic_sync_interval_ms() -> u64 {
    300_000
}

fn default_autosave_offline_ms() -> u64 {
    1000
}

fn default_autosave_online_ms() -> u64 {
    3000
}

fn default_save_debounce_ms() -> u64 {
    500
}

fn default_sync_debounce_ms() -> u64 {
    1000
}

fn default_quality_check_interval_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_slow_latency_ms() -> u64 {
    3000
}

fn default_slow_bandwidth_mbps() -> f64 {
    1.0
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            conflict_strategy: ConflictStrategy::default(),
            periodic_sync_interval_ms: default_periodic_sync_interval_ms(),
            autosave_offline_ms: default_autosave_offline_ms(),
            autosave_online_ms: default_autosave_online_ms(),
            save_debounce_ms: default_save_debounce_ms(),
            sync_debounce_ms: default_sync_debounce_ms(),
            quality_check_interval_ms: default_quality_check_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            slow_latency_ms: default_slow_latency_ms(),
            slow_bandwidth_mbps: default_slow_bandwidth_mbps(),
            remote: RemoteConfig::default(),
            quota: Quota::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: None,
            health_path: default_health_path(),
            token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Delay before retry number `retry` (1-based).
    ///
    /// `min(initial * multiplier^(retry-1), max)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Autosave cadence for the given connectivity.
    pub fn autosave_interval(&self, online: bool) -> Duration {
        if online {
            Duration::from_millis(self.autosave_online_ms)
        } else {
            Duration::from_millis(self.autosave_offline_ms)
        }
    }

    /// Checks values that would make timers spin or never fire.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(Error::Config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(Error::Config(format!(
                "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        let timers = [
            ("periodic_sync_interval_ms", self.periodic_sync_interval_ms),
            ("autosave_offline_ms", self.autosave_offline_ms),
            ("autosave_online_ms", self.autosave_online_ms),
            ("quality_check_interval_ms", self.quality_check_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if let Some(url) = &self.remote.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "invalid remote URL '{url}': must start with http:// or https://"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
