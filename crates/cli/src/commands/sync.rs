// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use kn_sync::{ProcessReport, SyncContext, SyncReport};

use crate::error::{Error, Result};

pub async fn run(ctx: &SyncContext) -> Result<()> {
    let (processed, synced) = ctx.sync_now().await?;
    print!("{}", format_reports(&processed, &synced));
    match synced.error {
        Some(message) => Err(Error::SyncFailed(message)),
        None => Ok(()),
    }
}

pub(crate) fn format_reports(processed: &ProcessReport, synced: &SyncReport) -> String {
    let mut out = format!(
        "actions: {} delivered, {} retrying, {} failed\n",
        processed.delivered, processed.retried, processed.failed
    );
    if synced.error.is_none() {
        out.push_str(&format!(
            "sync:    {} sent, {} received, {} applied",
            synced.sent, synced.received, synced.applied
        ));
        if synced.conflicts > 0 {
            out.push_str(&format!(", {} conflicts (see `kn resolve`)", synced.conflicts));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
