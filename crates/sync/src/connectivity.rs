// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity monitoring.
//!
//! The [`ConnectivityMonitor`] owns the [`ConnectivityState`]; nothing else
//! may change it. State is derived from measurements taken by a [`Probe`]:
//! once at start, every quality-check interval, and whenever the host
//! reports a network change.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kn_core::ConnectivityState;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RemoteConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};

/// One observation of the network.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    pub reachable: bool,
    /// Round trip of the probe, when one completed.
    pub latency: Option<Duration>,
    /// Effective bandwidth, when the platform reports it.
    pub bandwidth_mbps: Option<f64>,
    /// The platform asked us to save data.
    pub save_data: bool,
}

impl Measurement {
    pub fn unreachable() -> Self {
        Measurement::default()
    }

    pub fn reachable(latency: Duration) -> Self {
        Measurement {
            reachable: true,
            latency: Some(latency),
            ..Measurement::default()
        }
    }
}

/// Limits below which a reachable network counts as slow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub slow_latency: Duration,
    pub slow_bandwidth_mbps: f64,
}

impl Thresholds {
    pub fn from_config(config: &SyncConfig) -> Self {
        Thresholds {
            slow_latency: Duration::from_millis(config.slow_latency_ms),
            slow_bandwidth_mbps: config.slow_bandwidth_mbps,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Maps a measurement onto a connectivity state.
pub fn classify(measurement: &Measurement, thresholds: &Thresholds) -> ConnectivityState {
    if !measurement.reachable {
        return ConnectivityState::Offline;
    }
    if measurement.save_data {
        return ConnectivityState::Limited;
    }
    let slow_bandwidth = measurement
        .bandwidth_mbps
        .is_some_and(|mbps| mbps < thresholds.slow_bandwidth_mbps);
    let slow_latency = measurement
        .latency
        .is_some_and(|latency| latency > thresholds.slow_latency);
    if slow_bandwidth || slow_latency {
        return ConnectivityState::Slow;
    }
    ConnectivityState::Online
}

/// Takes a measurement of the network.
pub trait Probe: Send + Sync {
    fn measure(&self) -> Pin<Box<dyn Future<Output = Measurement> + Send + '_>>;
}

/// Probes reachability with a HEAD request to the authority's health path.
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Returns `None` when no remote URL is configured.
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Option<Self> {
        let base = config.url.as_deref()?.trim_end_matches('/');
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to build probe client");
                return None;
            }
        };
        Some(HttpProbe {
            url: format!("{base}{}", config.health_path),
            client,
        })
    }
}

impl Probe for HttpProbe {
    fn measure(&self) -> Pin<Box<dyn Future<Output = Measurement> + Send + '_>> {
        Box::pin(async move {
            let started = Instant::now();
            match self.client.head(&self.url).send().await {
                // Any answer, even an error status, proves the host is reachable.
                Ok(response) => {
                    debug!(status = %response.status(), "health probe answered");
                    Measurement::reachable(started.elapsed())
                }
                Err(e) => {
                    debug!(error = %e, "health probe failed");
                    Measurement::unreachable()
                }
            }
        })
    }
}

/// A probe for a subsystem with no remote: never reachable.
#[derive(Debug, Default)]
pub struct NoRemoteProbe;

impl Probe for NoRemoteProbe {
    fn measure(&self) -> Pin<Box<dyn Future<Output = Measurement> + Send + '_>> {
        Box::pin(async { Measurement::unreachable() })
    }
}

/// Connectivity notification from the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkChange {
    /// An interface came up; re-measure.
    Up,
    /// All interfaces went down.
    Down,
    /// The data-saving preference changed.
    DataSaver(bool),
}

struct MonitorInner {
    probe: Arc<dyn Probe>,
    thresholds: Thresholds,
    probe_timeout: Duration,
    check_interval: Duration,
    state: watch::Sender<ConnectivityState>,
    save_data: AtomicBool,
    events: EventBus,
    cancel: CancellationToken,
}

/// Tracks reachability and quality of the network.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the `OFFLINE` state; call [`start`](Self::start)
    /// to take the initial measurement.
    pub fn new(probe: Arc<dyn Probe>, config: &SyncConfig, events: EventBus) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Offline);
        ConnectivityMonitor {
            inner: Arc::new(MonitorInner {
                probe,
                thresholds: Thresholds::from_config(config),
                probe_timeout: Duration::from_millis(config.probe_timeout_ms),
                check_interval: Duration::from_millis(config.quality_check_interval_ms),
                state,
                save_data: AtomicBool::new(false),
                events,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Takes the initial measurement and starts periodic re-measurement.
    pub async fn start(&self) -> ConnectivityState {
        let state = self.refresh().await;

        let monitor = self.clone();
        let cancel = self.inner.cancel.clone();
        let period = self.inner.check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        monitor.refresh().await;
                    }
                }
            }
        });
        state
    }

    /// Measures now and updates the state.
    pub async fn refresh(&self) -> ConnectivityState {
        let measured =
            match tokio::time::timeout(self.inner.probe_timeout, self.inner.probe.measure()).await {
                Ok(m) => m,
                Err(_) => {
                    debug!(timeout = ?self.inner.probe_timeout, "probe timed out");
                    Measurement::unreachable()
                }
            };
        let measurement = Measurement {
            save_data: measured.save_data || self.inner.save_data.load(Ordering::Acquire),
            ..measured
        };
        let state = classify(&measurement, &self.inner.thresholds);
        self.set_state(state);
        state
    }

    /// Feeds a host connectivity notification into the state machine.
    pub async fn notify_network_change(&self, change: NetworkChange) -> ConnectivityState {
        match change {
            NetworkChange::Down => {
                self.set_state(ConnectivityState::Offline);
                ConnectivityState::Offline
            }
            NetworkChange::Up => self.refresh().await,
            NetworkChange::DataSaver(on) => {
                self.inner.save_data.store(on, Ordering::Release);
                self.refresh().await
            }
        }
    }

    fn set_state(&self, next: ConnectivityState) {
        let mut previous = next;
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });
        if changed {
            info!(from = %previous, to = %next, "connectivity changed");
            self.inner.events.emit(SyncEvent::ConnectivityChanged {
                from: previous,
                to: next,
            });
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    /// True unless the network is unreachable. Slow and limited networks
    /// still carry traffic.
    pub fn is_online(&self) -> bool {
        self.state().is_reachable()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == ConnectivityState::Offline
    }

    pub fn is_slow(&self) -> bool {
        self.state() == ConnectivityState::Slow
    }

    /// Watches state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.inner.state.subscribe()
    }

    /// Resolves once the network is reachable; immediately if it already is.
    ///
    /// Fails with [`Error::Aborted`] if `abort` fires or the monitor shuts
    /// down first.
    pub async fn wait_for_online(&self, abort: &CancellationToken) -> Result<()> {
        let mut rx = self.subscribe();
        loop {
            if rx.borrow_and_update().is_reachable() {
                return Ok(());
            }
            tokio::select! {
                _ = abort.cancelled() => return Err(Error::Aborted),
                _ = self.inner.cancel.cancelled() => return Err(Error::Aborted),
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(Error::Aborted);
                    }
                }
            }
        }
    }

    /// Stops periodic measurement.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
