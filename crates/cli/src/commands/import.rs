// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use kn_core::Snapshot;
use kn_sync::SyncContext;

use crate::error::Result;

/// Replaces local state from `filepath`, or stdin for `-`.
pub fn run(ctx: &SyncContext, filepath: &str) -> Result<()> {
    let snapshot = if filepath == "-" {
        Snapshot::read_from(std::io::stdin())?
    } else {
        Snapshot::load(Path::new(filepath))?
    };
    ctx.store().import_snapshot(&snapshot)?;
    println!(
        "imported {} documents, {} actions, {} preferences",
        snapshot.documents.len(),
        snapshot.actions.len(),
        snapshot.preferences.len()
    );
    Ok(())
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
