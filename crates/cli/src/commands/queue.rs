// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::str::FromStr;

use kn_core::{ActionKind, ActionRequest, ActionStatus, Priority, QueuedAction, ResourceType};
use kn_sync::SyncContext;

use crate::cli::OutputFormat;
use crate::error::Result;

pub fn list(ctx: &SyncContext, status: Option<&str>, output: OutputFormat) -> Result<()> {
    let status = status.map(ActionStatus::from_str).transpose()?;
    let actions = ctx.queue().list(status)?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&actions)?),
        OutputFormat::Text => {
            if actions.is_empty() {
                println!("queue is empty");
            }
            for action in &actions {
                println!("{}", format_action(action));
            }
        }
    }
    Ok(())
}

pub(crate) fn format_action(action: &QueuedAction) -> String {
    let mut line = format!(
        "{}  {:<10} {:<8} {} {} {}",
        action.id,
        action.status.as_str(),
        action.priority.as_str(),
        action.kind(),
        action.resource_type(),
        action.resource_id
    );
    if action.retry_count > 0 {
        line.push_str(&format!("  retries={}", action.retry_count));
    }
    if let Some(at) = action.next_attempt_at {
        line.push_str(&format!("  next={}", at.format("%H:%M:%S")));
    }
    if let Some(error) = &action.last_error {
        line.push_str(&format!("  error={error}"));
    }
    line
}

/// Queues an action built from loose command-line parts.
pub async fn add(
    ctx: &SyncContext,
    kind: &str,
    resource_type: &str,
    resource_id: &str,
    payload: &str,
    priority: &str,
) -> Result<()> {
    let payload: serde_json::Value = serde_json::from_str(payload)?;
    let request = ActionRequest::from_parts(
        ActionKind::from_str(kind)?,
        ResourceType::from_str(resource_type)?,
        resource_id,
        payload,
    )?
    .with_priority(Priority::from_str(priority)?);

    super::refresh_connectivity(ctx).await;
    let action = ctx.queue().enqueue(request)?;
    if ctx.monitor().is_online() {
        ctx.queue().process().await;
    }
    println!("queued {}", action.id);
    Ok(())
}

pub fn retry(ctx: &SyncContext, id: &str) -> Result<()> {
    let action = ctx.queue().retry(id)?;
    println!("{}: back to {}", action.id, action.status);
    Ok(())
}

pub fn retry_all(ctx: &SyncContext) -> Result<()> {
    let count = ctx.queue().retry_all_failed()?;
    println!("{count} failed actions requeued");
    Ok(())
}

pub fn clear_failed(ctx: &SyncContext) -> Result<()> {
    let count = ctx.queue().clear_failed()?;
    println!("{count} failed actions removed");
    Ok(())
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
