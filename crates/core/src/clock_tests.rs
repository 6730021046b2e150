// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn vc(entries: &[(&str, u64)]) -> VectorClock {
    entries.iter().map(|&(k, v)| (k, v)).collect()
}

#[test]
fn increment_creates_entry_lazily() {
    let mut clock = VectorClock::new();
    assert_eq!(clock.get("a"), 0);
    assert!(clock.is_empty());

    assert_eq!(clock.increment("a"), 1);
    assert_eq!(clock.increment("a"), 2);
    assert_eq!(clock.get("a"), 2);
    assert_eq!(clock.get("b"), 0);
}

#[test]
fn merge_takes_component_max() {
    let mut a = vc(&[("a", 3), ("b", 1)]);
    let b = vc(&[("b", 4), ("c", 2)]);
    a.merge(&b);
    assert_eq!(a, vc(&[("a", 3), ("b", 4), ("c", 2)]));
}

#[parameterized(
    disjoint = { &[("a", 1)], &[("b", 1)] },
    overlapping = { &[("a", 3), ("b", 1)], &[("a", 1), ("b", 5), ("c", 2)] },
    empty_left = { &[], &[("x", 7)] },
    identical = { &[("n", 2)], &[("n", 2)] },
)]
fn merge_is_commutative(left: &[(&str, u64)], right: &[(&str, u64)]) {
    let a = vc(left);
    let b = vc(right);
    assert_eq!(a.merged(&b), b.merged(&a));
}

#[parameterized(
    empty = { &[] },
    single = { &[("a", 1)] },
    several = { &[("a", 3), ("b", 9), ("c", 0)] },
)]
fn merge_is_idempotent(entries: &[(&str, u64)]) {
    let a = vc(entries);
    assert_eq!(a.merged(&a), a);
}

#[test]
fn merge_is_associative() {
    let a = vc(&[("a", 1), ("b", 5)]);
    let b = vc(&[("b", 2), ("c", 3)]);
    let c = vc(&[("a", 4), ("c", 1)]);
    assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
}

#[parameterized(
    equal = { &[("a", 1)], &[("a", 1)], CausalOrder::Equal },
    before = { &[("a", 1)], &[("a", 2)], CausalOrder::Before },
    after = { &[("a", 2), ("b", 1)], &[("a", 2)], CausalOrder::After },
    concurrent = { &[("a", 1)], &[("b", 1)], CausalOrder::Concurrent },
    empty_before_anything = { &[], &[("b", 1)], CausalOrder::Before },
)]
fn compare_clocks(left: &[(&str, u64)], right: &[(&str, u64)], expected: CausalOrder) {
    assert_eq!(vc(left).compare(&vc(right)), expected);
}

#[test]
fn dominates_treats_missing_entries_as_zero() {
    let a = vc(&[("a", 2)]);
    let b = vc(&[("a", 1), ("b", 0)]);
    assert!(a.dominates(&b));
    assert!(!b.dominates(&a));
    assert!(a.happened_before(&vc(&[("a", 2), ("b", 1)])));
    assert!(a.concurrent_with(&vc(&[("b", 1)])));
}

#[test]
fn display_lists_entries_in_order() {
    let clock = vc(&[("b", 2), ("a", 1)]);
    assert_eq!(clock.to_string(), "{a:1,b:2}");
}

#[test]
fn serializes_as_plain_map() {
    let clock = vc(&[("node-1", 4)]);
    let json = serde_json::to_string(&clock).unwrap();
    assert_eq!(json, r#"{"node-1":4}"#);
    let back: VectorClock = serde_json::from_str(&json).unwrap();
    assert_eq!(back, clock);
}

#[test]
fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    clock.advance(500);
    assert_eq!(clock.now_ms(), 1_500);
    clock.set(10);
    assert_eq!(clock.now().timestamp_millis(), 10);
}

#[test]
fn system_clock_is_after_epoch() {
    assert!(SystemClock.now_ms() > 0);
}
