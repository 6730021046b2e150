// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use kn_core::op::char_len;
use kn_core::Operation;
use kn_sync::{EditingSession, SyncContext};

use crate::error::{Error, Result};

use super::refresh_connectivity;

/// One edit requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    Set(String),
    Insert { text: String, at: Option<usize> },
    Delete { len: usize, at: usize },
}

impl EditRequest {
    /// Builds the request from the mutually exclusive flags.
    pub fn from_flags(
        set: Option<String>,
        insert: Option<String>,
        delete: Option<usize>,
        at: Option<usize>,
    ) -> Result<Self> {
        match (set, insert, delete) {
            (Some(content), None, None) => Ok(EditRequest::Set(content)),
            (None, Some(text), None) => Ok(EditRequest::Insert { text, at }),
            (None, None, Some(len)) => match at {
                Some(at) => Ok(EditRequest::Delete { len, at }),
                None => Err(Error::InvalidEdit("--delete needs --at".into())),
            },
            (None, None, None) => Err(Error::InvalidEdit("nothing to do".into())),
            _ => Err(Error::InvalidEdit("only one edit per call".into())),
        }
    }
}

/// Opens a session, applies the edit and closes it, which saves.
pub async fn run(ctx: &SyncContext, id: &str, request: EditRequest) -> Result<()> {
    refresh_connectivity(ctx).await;
    let session = ctx.open_session(id).await?;
    let applied = apply(&session, request);
    // Close even when the edit failed so timers stop.
    session.destroy()?;
    applied?;

    if ctx.monitor().is_online() {
        ctx.queue().process().await;
    }
    let status = session.get_save_status();
    println!("{id}: saved ({})", status.sync_status);
    Ok(())
}

pub(crate) fn apply(session: &EditingSession, request: EditRequest) -> Result<Operation> {
    let op = match request {
        EditRequest::Set(content) => session.handle_change(&content)?,
        EditRequest::Insert { text, at } => {
            let end = session.content().map(|c| char_len(&c)).unwrap_or(0);
            session.handle_insert(at.unwrap_or(end), &text)?
        }
        EditRequest::Delete { len, at } => session.handle_delete(at, len)?,
    };
    Ok(op)
}

#[cfg(test)]
#[path = "edit_tests.rs"]
mod tests;
