// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Operational transformation of concurrent edits.
//!
//! Two operation sequences authored against the same base text are made
//! applicable one after the other by shifting positions:
//!
//! - Inserts at the same position are ordered by `(origin_id, timestamp)`
//! - A delete spanning a concurrent insert is split around it
//! - Overlapping deletes are trimmed so no character is removed twice
//! - A whole-content update discards concurrent positional edits; between
//!   two updates the later one wins

use std::cmp::Ordering;

use crate::error::Result;
use crate::op::{replay, slice_chars, OpKind, Operation};

/// Rewrites `op` so it applies after `against` has been applied.
///
/// Both operations must have been authored against the same text. The
/// result is empty when `against` already covers the edit, and holds two
/// operations when a delete is split around an insert.
pub fn transform(op: &Operation, against: &Operation) -> Vec<Operation> {
    match (op.kind, against.kind) {
        (_, OpKind::Format) => vec![op.clone()],
        (OpKind::Update, OpKind::Update) => {
            if wins(op, against) {
                vec![op.clone()]
            } else {
                Vec::new()
            }
        }
        (OpKind::Update, _) => vec![op.clone()],
        (_, OpKind::Update) => Vec::new(),
        (_, OpKind::Insert) => against_insert(op, against),
        (_, OpKind::Delete) => against_delete(op, against),
    }
}

/// Transforms two sequences against each other.
///
/// Returns `(a', b')` where `a'` applies after `b` and `b'` applies after `a`.
pub fn transform_pair(a: &[Operation], b: &[Operation]) -> (Vec<Operation>, Vec<Operation>) {
    match (a, b) {
        ([], _) => (Vec::new(), b.to_vec()),
        (_, []) => (a.to_vec(), Vec::new()),
        ([x], [y]) => (transform(x, y), transform(y, x)),
        ([first, rest @ ..], _) if !rest.is_empty() => {
            let (first_t, b1) = transform_pair(std::slice::from_ref(first), b);
            let (rest_t, b2) = transform_pair(rest, &b1);
            let mut out = first_t;
            out.extend(rest_t);
            (out, b2)
        }
        (_, [first, rest @ ..]) => {
            let (a1, first_t) = transform_pair(a, std::slice::from_ref(first));
            let (a2, rest_t) = transform_pair(&a1, rest);
            let mut out = first_t;
            out.extend(rest_t);
            (a2, out)
        }
    }
}

/// Merges local and remote edits made against a common base.
///
/// Remote operations are applied first; local operations are transformed
/// against them and applied on top.
pub fn three_way_merge(base: &str, local: &[Operation], remote: &[Operation]) -> Result<String> {
    let remote_text = replay(base, remote)?;
    let (local_t, _) = transform_pair(local, remote);
    replay(&remote_text, &local_t)
}

/// Tie-break between concurrent operations.
fn wins(op: &Operation, other: &Operation) -> bool {
    match op.timestamp.cmp(&other.timestamp) {
        Ordering::Equal => op.origin_id > other.origin_id,
        ord => ord == Ordering::Greater,
    }
}

fn against_insert(op: &Operation, insert: &Operation) -> Vec<Operation> {
    let p = insert.position.unwrap_or_default();
    let n = insert.span();
    let q = op.position.unwrap_or_default();
    let m = op.span();

    match op.kind {
        OpKind::Insert => {
            let shift = q > p || (q == p && tie_after(op, insert));
            vec![at(op, if shift { q + n } else { q })]
        }
        OpKind::Delete if q >= p => vec![at(op, q + n)],
        OpKind::Delete if q + m > p => {
            let removed = op.content.as_deref().unwrap_or_default();
            let head = slice_chars(removed, 0, p - q);
            let tail = slice_chars(removed, p - q, m - (p - q));
            vec![
                Operation::delete(q, head, op.origin_id.clone(), op.timestamp),
                Operation::delete(q + n, tail, op.origin_id.clone(), op.timestamp),
            ]
        }
        OpKind::Format if q >= p => vec![at(op, q + n)],
        OpKind::Format if q + m > p => vec![with_length(op, q, m + n)],
        _ => vec![op.clone()],
    }
}

fn against_delete(op: &Operation, delete: &Operation) -> Vec<Operation> {
    let p = delete.position.unwrap_or_default();
    let n = delete.span();
    let q = op.position.unwrap_or_default();
    let m = op.span();

    match op.kind {
        OpKind::Insert => {
            let pos = if q <= p {
                q
            } else if q >= p + n {
                q - n
            } else {
                p
            };
            vec![at(op, pos)]
        }
        OpKind::Delete | OpKind::Format => {
            if q >= p + n {
                return vec![at(op, q - n)];
            }
            if q + m <= p {
                return vec![op.clone()];
            }
            // Keep the parts of [q, q+m) outside [p, p+n).
            let head = p.saturating_sub(q).min(m);
            let tail_start = (p + n).saturating_sub(q).min(m);
            let tail = m - tail_start;
            if head + tail == 0 {
                return Vec::new();
            }
            let pos = q.min(p);
            if op.kind == OpKind::Format {
                return vec![with_length(op, pos, head + tail)];
            }
            let removed = op.content.as_deref().unwrap_or_default();
            let mut kept = slice_chars(removed, 0, head);
            kept.push_str(&slice_chars(removed, tail_start, tail));
            vec![Operation::delete(pos, kept, op.origin_id.clone(), op.timestamp)]
        }
        OpKind::Update => vec![op.clone()],
    }
}

/// Concurrent inserts at the same position: the larger origin goes after.
fn tie_after(op: &Operation, other: &Operation) -> bool {
    match op.origin_id.cmp(&other.origin_id) {
        Ordering::Equal => op.timestamp > other.timestamp,
        ord => ord == Ordering::Greater,
    }
}

fn at(op: &Operation, position: usize) -> Operation {
    let mut out = op.clone();
    out.position = Some(position);
    out
}

fn with_length(op: &Operation, position: usize, length: usize) -> Operation {
    let mut out = at(op, position);
    if let Some(attrs) = out.attributes.as_mut() {
        attrs.insert("length".to_string(), serde_json::Value::from(length));
    }
    out
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
