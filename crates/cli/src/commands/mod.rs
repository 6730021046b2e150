// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod edit;
pub mod export;
pub mod import;
pub mod prefs;
pub mod queue;
pub mod resolve;
pub mod show;
pub mod status;
pub mod sync;
#[cfg(test)]
#[path = "mod_tests.rs"]
pub mod testing;

use kn_core::LocalStore;
use kn_sync::SyncContext;
use tracing::debug;

use crate::cli::GlobalArgs;
use crate::config::Config;
use crate::error::Result;

/// Opens the store and wires the sync subsystem from the config file.
///
/// Nothing is started: commands drive the queue and the engine themselves.
pub fn open_context(global: &GlobalArgs) -> Result<SyncContext> {
    let config = Config::discover(global.config.as_deref())?;
    let node_id = config.node_id();
    let store_path = config.store_path(&node_id, global.store.as_deref())?;
    debug!(node = %node_id, store = %store_path.display(), "opening local store");

    let store = LocalStore::open_or_memory(&store_path)?;
    let mut builder = SyncContext::builder(node_id, store).config(config.sync);
    if let Some(workspace) = config.workspace {
        builder = builder.workspace(workspace);
    }
    Ok(builder.build()?)
}

/// Re-measures connectivity when there is a remote to reach.
pub async fn refresh_connectivity(ctx: &SyncContext) {
    if ctx.capabilities().remote_configured {
        ctx.monitor().refresh().await;
    }
}
