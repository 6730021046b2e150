// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Vector clocks for causal ordering between replicas.
//!
//! A vector clock maps node IDs to counters. Each node only ever increments
//! its own entry; entries from other nodes arrive through merges.
//!
//! Ordering rules:
//! 1. A dominates B when every counter in A is >= the matching counter in B
//! 2. A happened before B when B dominates A and they differ
//! 3. Otherwise the clocks are concurrent
//!
//! Merging takes the component-wise maximum, which is commutative,
//! associative and idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Both clocks carry the same history.
    Equal,
    /// The left clock happened before the right one.
    Before,
    /// The left clock happened after the right one.
    After,
    /// Neither clock has seen the other's latest events.
    Concurrent,
}

/// A causal version vector keyed by node ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Creates an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter for a node (0 when the node has no entry).
    pub fn get(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }

    /// Increments this node's counter and returns the new value.
    ///
    /// Entries are created lazily on first increment.
    pub fn increment(&mut self, node_id: &str) -> u64 {
        let counter = self.counters.entry(node_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Merges another clock into this one by component-wise maximum.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &value) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    /// Returns the merge of two clocks without modifying either.
    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Returns true if this clock has seen everything `other` has.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .counters
            .iter()
            .all(|(node, &value)| self.get(node) >= value)
    }

    /// Compares two clocks causally.
    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Returns true if this clock happened strictly before `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if neither clock dominates the other.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Returns true if no node has an entry.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Iterates over `(node_id, counter)` pairs in node order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (node, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{node}:{value}")?;
        }
        write!(f, "}}")
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        VectorClock {
            counters: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Trait for getting the current wall clock time.
///
/// This allows injecting a controllable clock for testing.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> i64;

    /// Returns the current time as a UTC timestamp.
    fn now(&self) -> DateTime<Utc> {
        from_millis(self.now_ms())
    }
}

/// System clock implementation using `std::time::SystemTime`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    time_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `initial_ms`.
    pub fn new(initial_ms: i64) -> Self {
        ManualClock {
            time_ms: AtomicI64::new(initial_ms),
        }
    }

    /// Sets the current time.
    pub fn set(&self, ms: i64) {
        self.time_ms.store(ms, AtomicOrdering::SeqCst);
    }

    /// Moves the clock forward.
    pub fn advance(&self, ms: i64) {
        self.time_ms.fetch_add(ms, AtomicOrdering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> i64 {
        self.time_ms.load(AtomicOrdering::SeqCst)
    }
}

/// Converts epoch milliseconds to a UTC timestamp, saturating at the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
