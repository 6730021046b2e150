// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Edit operations on document content.
//!
//! Every local edit is recorded as an [`Operation`]. Operations are:
//!
//! - Serializable: stored in the document's pending list and exchanged in deltas
//! - Replayable: applying a sequence to a base text reproduces the edit
//! - Transformable: positions can be shifted against concurrent operations
//!
//! Positions and lengths count characters, not bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kind of edit an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Insert `content` at `position`.
    Insert,
    /// Remove the characters recorded in `content` starting at `position`.
    Delete,
    /// Replace the whole document content.
    Update,
    /// Apply formatting attributes; does not change the text.
    Format,
}

impl OpKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Delete => "delete",
            OpKind::Update => "update",
            OpKind::Format => "format",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(OpKind::Insert),
            "delete" => Ok(OpKind::Delete),
            "update" => Ok(OpKind::Update),
            "format" => Ok(OpKind::Format),
            _ => Err(Error::InvalidOpKind(s.to_string())),
        }
    }
}

/// One atomic edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub kind: OpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Inserted text, deleted text, or the full replacement content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
    pub timestamp: DateTime<Utc>,
    /// The node that authored the edit.
    pub origin_id: String,
}

impl Operation {
    /// Creates an insert operation.
    pub fn insert(
        position: usize,
        text: impl Into<String>,
        origin_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Operation {
            kind: OpKind::Insert,
            position: Some(position),
            content: Some(text.into()),
            attributes: None,
            timestamp,
            origin_id: origin_id.into(),
        }
    }

    /// Creates a delete operation recording the removed text.
    pub fn delete(
        position: usize,
        removed: impl Into<String>,
        origin_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Operation {
            kind: OpKind::Delete,
            position: Some(position),
            content: Some(removed.into()),
            attributes: None,
            timestamp,
            origin_id: origin_id.into(),
        }
    }

    /// Creates a whole-content update.
    pub fn update(
        content: impl Into<String>,
        origin_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Operation {
            kind: OpKind::Update,
            position: None,
            content: Some(content.into()),
            attributes: None,
            timestamp,
            origin_id: origin_id.into(),
        }
    }

    /// Creates a format operation over `length` characters.
    pub fn format(
        position: usize,
        length: usize,
        attributes: BTreeMap<String, serde_json::Value>,
        origin_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut attributes = attributes;
        attributes.insert("length".to_string(), serde_json::Value::from(length));
        Operation {
            kind: OpKind::Format,
            position: Some(position),
            content: None,
            attributes: Some(attributes),
            timestamp,
            origin_id: origin_id.into(),
        }
    }

    /// Number of characters this operation spans.
    ///
    /// For inserts and deletes this is the length of `content`; for formats
    /// it is the `length` attribute.
    pub fn span(&self) -> usize {
        match self.kind {
            OpKind::Insert | OpKind::Delete | OpKind::Update => {
                self.content.as_deref().map_or(0, |c| c.chars().count())
            }
            OpKind::Format => self
                .attributes
                .as_ref()
                .and_then(|a| a.get("length"))
                .and_then(|v| v.as_u64())
                .map_or(0, |v| v as usize),
        }
    }

    /// Checks the structural requirements of this operation's kind.
    ///
    /// Insert and delete require a position and content; update requires
    /// content.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            OpKind::Insert | OpKind::Delete => {
                if self.position.is_none() {
                    return Err(Error::InvalidOperation(format!(
                        "{} requires a position",
                        self.kind
                    )));
                }
                if self.content.is_none() {
                    return Err(Error::InvalidOperation(format!(
                        "{} requires content",
                        self.kind
                    )));
                }
            }
            OpKind::Update => {
                if self.content.is_none() {
                    return Err(Error::InvalidOperation("update requires content".into()));
                }
            }
            OpKind::Format => {
                if self.position.is_none() {
                    return Err(Error::InvalidOperation("format requires a position".into()));
                }
            }
        }
        Ok(())
    }

    /// Applies this operation to `text` in place.
    pub fn apply_to(&self, text: &mut String) -> Result<()> {
        self.validate()?;
        let content = self.content.as_deref().unwrap_or_default();
        match self.kind {
            OpKind::Insert => {
                let position = self.position.unwrap_or_default();
                insert_chars(text, position, content);
            }
            OpKind::Delete => {
                let position = self.position.unwrap_or_default();
                delete_chars(text, position, self.span());
            }
            OpKind::Update => {
                text.clear();
                text.push_str(content);
            }
            OpKind::Format => {}
        }
        Ok(())
    }
}

/// Replays operations in order on top of `base`.
pub fn replay<'a>(base: &str, ops: impl IntoIterator<Item = &'a Operation>) -> Result<String> {
    let mut text = base.to_string();
    for op in ops {
        op.apply_to(&mut text)?;
    }
    Ok(text)
}

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of character `char_idx`, clamped to the end of the text.
fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Inserts `insert` at character `char_idx`.
pub fn insert_chars(text: &mut String, char_idx: usize, insert: &str) {
    let at = byte_index(text, char_idx);
    text.insert_str(at, insert);
}

/// Removes `len` characters starting at `char_idx` and returns them.
pub fn delete_chars(text: &mut String, char_idx: usize, len: usize) -> String {
    let start = byte_index(text, char_idx);
    let end = byte_index(text, char_idx.saturating_add(len));
    text.drain(start..end).collect()
}

/// Returns `len` characters starting at `char_idx`.
pub fn slice_chars(text: &str, char_idx: usize, len: usize) -> String {
    text.chars().skip(char_idx).take(len).collect()
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;
