// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use kn_core::ConflictChoice;
use kn_sync::SyncContext;

use crate::error::{Error, Result};

/// Maps the mutually exclusive resolve flags to a choice.
pub fn choice_from_flags(local: bool, remote: bool, content: Option<String>) -> Result<ConflictChoice> {
    match (local, remote, content) {
        (true, false, None) => Ok(ConflictChoice::Local),
        (false, true, None) => Ok(ConflictChoice::Remote),
        (false, false, Some(content)) => Ok(ConflictChoice::Merged(content)),
        _ => Err(Error::InvalidEdit(
            "pick exactly one of --local, --remote or --content".into(),
        )),
    }
}

pub fn run(ctx: &SyncContext, id: &str, choice: ConflictChoice) -> Result<()> {
    let doc = ctx.engine().resolve_conflict_manually(id, choice)?;
    println!("{}: resolved ({}), sent on the next sync", doc.id, doc.sync_status);
    Ok(())
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
