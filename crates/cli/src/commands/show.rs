// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use kn_core::CachedDocument;
use kn_sync::SyncContext;

use crate::cli::OutputFormat;
use crate::error::Result;

pub fn run(ctx: &SyncContext, id: &str, output: OutputFormat) -> Result<()> {
    let doc = ctx.store().get_document(id)?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&doc)?),
        OutputFormat::Text => print!("{}", format_document(&doc)),
    }
    Ok(())
}

pub(crate) fn format_document(doc: &CachedDocument) -> String {
    let mut out = format!("{}  [{}]  v{}\n", doc.id, doc.sync_status, doc.version);
    if !doc.title.is_empty() {
        out.push_str(&format!("title:     {}\n", doc.title));
    }
    out.push_str(&format!("workspace: {}\n", doc.workspace_id));
    if let Some(collection) = &doc.collection_id {
        out.push_str(&format!("collection: {collection}\n"));
    }
    out.push_str(&format!(
        "modified:  {}\n",
        doc.last_modified.format("%Y-%m-%d %H:%M:%S")
    ));
    if !doc.local_changes.is_empty() {
        out.push_str(&format!("unsynced:  {} operations\n", doc.local_changes.len()));
    }
    if let Some(conflict) = &doc.conflict {
        out.push_str(&format!(
            "\nconflict detected {}\n  local:  {}\n  remote: {}\n  hint: run `kn resolve {} --local|--remote|--content <text>`\n",
            conflict.detected_at.format("%Y-%m-%d %H:%M:%S"),
            conflict.local,
            conflict.remote,
            doc.id
        ));
    }
    out.push('\n');
    out.push_str(&doc.content);
    if !doc.content.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "show_tests.rs"]
mod tests;
