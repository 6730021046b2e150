// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use kn_core::{ActionCounts, SyncStatus};
use kn_sync::SyncContext;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::Result;

use super::refresh_connectivity;

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct DocumentCounts {
    pub synced: usize,
    pub pending: usize,
    pub conflict: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusReport {
    pub node_id: String,
    pub connectivity: String,
    pub remote_configured: bool,
    pub persistent: bool,
    pub documents: DocumentCounts,
    pub actions: ActionCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

pub async fn run(ctx: &SyncContext, output: OutputFormat) -> Result<()> {
    refresh_connectivity(ctx).await;
    let report = gather(ctx)?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", format_text(&report)),
    }
    Ok(())
}

pub(crate) fn gather(ctx: &SyncContext) -> Result<StatusReport> {
    let store = ctx.store();
    let count = |status| -> Result<usize> { Ok(store.list_documents(Some(status))?.len()) };
    let capabilities = ctx.capabilities();

    Ok(StatusReport {
        node_id: ctx.node_id().to_string(),
        connectivity: ctx.monitor().state().to_string(),
        remote_configured: capabilities.remote_configured,
        persistent: capabilities.persistent,
        documents: DocumentCounts {
            synced: count(SyncStatus::Synced)?,
            pending: count(SyncStatus::Pending)?,
            conflict: count(SyncStatus::Conflict)?,
        },
        actions: store.action_counts()?,
        last_sync: store.sync_metadata()?.and_then(|m| m.last_sync_time),
    })
}

pub(crate) fn format_text(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("node:       {}\n", report.node_id));
    if report.remote_configured {
        out.push_str(&format!("network:    {}\n", report.connectivity));
    } else {
        out.push_str("network:    no remote configured (local only)\n");
    }
    if !report.persistent {
        out.push_str("storage:    memory only, changes will not survive this process\n");
    }
    let docs = &report.documents;
    out.push_str(&format!(
        "documents:  {} synced, {} pending, {} in conflict\n",
        docs.synced, docs.pending, docs.conflict
    ));
    let actions = &report.actions;
    out.push_str(&format!(
        "actions:    {} pending, {} processing, {} failed\n",
        actions.pending, actions.processing, actions.failed
    ));
    match report.last_sync {
        Some(at) => out.push_str(&format!("last sync:  {}\n", at.format("%Y-%m-%d %H:%M:%S"))),
        None => out.push_str("last sync:  never\n"),
    }
    out
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
