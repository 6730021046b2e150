// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! knrs - the library behind the `kn` command line.
//!
//! Each command opens the local store, wires a [`kn_sync::SyncContext`]
//! from the config file, and drives it once. Nothing runs in the
//! background between invocations: offline edits wait in the store until
//! `kn sync` (or an edit made while online) sends them.
//!
//! # Main Components
//!
//! - [`Cli`] - argument parsing
//! - [`Config`] - `config.toml`, node identity and store location
//! - [`Error`] - errors with hints for common mistakes

mod cli;
mod commands;

pub mod config;
pub mod env;
pub mod error;

pub use cli::{Cli, Command, GlobalArgs, OutputFormat, PrefsCommand, QueueCommand};
pub use config::Config;
pub use error::{Error, Result};

use kn_sync::SyncContext;

use commands::edit::EditRequest;

/// Execute a CLI invocation on a fresh runtime.
pub fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let ctx = commands::open_context(&cli.global)?;
        let result = execute(&ctx, cli.command).await;
        ctx.shutdown();
        result
    })
}

/// Execute one command against an open context.
pub async fn execute(ctx: &SyncContext, command: Command) -> Result<()> {
    match command {
        Command::Status { output } => commands::status::run(ctx, output).await,
        Command::Sync => commands::sync::run(ctx).await,
        Command::Show { id, output } => commands::show::run(ctx, &id, output),
        Command::Edit {
            id,
            set,
            insert,
            delete,
            at,
        } => {
            let request = EditRequest::from_flags(set, insert, delete, at)?;
            commands::edit::run(ctx, &id, request).await
        }
        Command::Resolve {
            id,
            local,
            remote,
            content,
        } => {
            let choice = commands::resolve::choice_from_flags(local, remote, content)?;
            commands::resolve::run(ctx, &id, choice)
        }
        Command::Queue(QueueCommand::List { status, output }) => {
            commands::queue::list(ctx, status.as_deref(), output)
        }
        Command::Queue(QueueCommand::Add {
            kind,
            resource_type,
            resource_id,
            payload,
            priority,
        }) => {
            commands::queue::add(ctx, &kind, &resource_type, &resource_id, &payload, &priority)
                .await
        }
        Command::Queue(QueueCommand::Retry { id }) => commands::queue::retry(ctx, &id),
        Command::Queue(QueueCommand::RetryAll) => commands::queue::retry_all(ctx),
        Command::Queue(QueueCommand::ClearFailed) => commands::queue::clear_failed(ctx),
        Command::Export { filepath } => commands::export::run(ctx, &filepath),
        Command::Import { filepath } => commands::import::run(ctx, &filepath),
        Command::Prefs(PrefsCommand::Get { key }) => commands::prefs::get(ctx, key.as_deref()),
        Command::Prefs(PrefsCommand::Set { key, value }) => {
            commands::prefs::set(ctx, &key, &value)
        }
        Command::Prefs(PrefsCommand::Unset { key }) => commands::prefs::unset(ctx, &key),
    }
}
