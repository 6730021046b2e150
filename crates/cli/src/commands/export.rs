// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use kn_sync::SyncContext;

use crate::error::{Error, Result};

/// Writes a snapshot to `filepath`, or stdout for `-`.
pub fn run(ctx: &SyncContext, filepath: &str) -> Result<()> {
    if filepath.trim().is_empty() {
        return Err(Error::ExportPathEmpty);
    }
    let snapshot = ctx.store().export_snapshot()?;
    if filepath == "-" {
        snapshot.write_to(std::io::stdout())?;
        println!();
        return Ok(());
    }
    snapshot.save(Path::new(filepath))?;
    println!(
        "exported {} documents, {} actions, {} preferences to {filepath}",
        snapshot.documents.len(),
        snapshot.actions.len(),
        snapshot.preferences.len()
    );
    Ok(())
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
