// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

// Custom help template that groups commands into sections
const HELP_TEMPLATE: &str = "{about-with-newline}
{usage-heading} {usage}

{before-help}Options:
{options}{after-help}";

const COMMANDS_HELP: &str = "\
Documents:
  show        Show a cached document
  edit        Edit a document offline
  resolve     Resolve a held conflict

Sync:
  status      Show connectivity, queue and document counts
  sync        Drain the action queue and exchange changes now
  queue       Inspect and administer queued actions

Local state:
  export      Write a JSON snapshot of the local store
  import      Replace the local store from a snapshot
  prefs       Read and write preferences";

const QUICKSTART_HELP: &str = "\
Get started:
  kn edit notes --set \"hello\"     Edit offline, saved locally
  kn status                        See what is waiting to sync
  kn sync                          Push and pull once online";

#[derive(Parser)]
#[command(name = "kn")]
#[command(about = "Offline-first document sync client")]
#[command(
    long_about = "Offline-first document sync client.\n\n\
    Edits are saved to a local store, queued while offline, and reconciled \
    with the remote authority using vector clocks once connectivity returns."
)]
#[command(version)]
#[command(help_template = HELP_TEMPLATE)]
#[command(before_help = COMMANDS_HELP)]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options accepted by every command.
#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: $XDG_CONFIG_HOME/kn/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Local store database (default: $XDG_DATA_HOME/kn/<node>.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Log debug output to stderr (KN_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show connectivity, queue and document counts
    Status {
        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Drain the action queue and exchange changes now
    Sync,

    /// Show a cached document
    Show {
        /// Document ID
        id: String,

        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Edit a document through an editing session
    #[command(after_help = "Examples:\n  \
        kn edit doc-1 --set \"new text\"        Replace the content\n  \
        kn edit doc-1 --insert \"!\"            Append at the end\n  \
        kn edit doc-1 --insert \"# \" --at 0    Insert at the start\n  \
        kn edit doc-1 --delete 5 --at 0       Delete five characters")]
    #[command(group(ArgGroup::new("edit").required(true).args(["set", "insert", "delete"])))]
    Edit {
        /// Document ID
        id: String,

        /// Replace the whole content
        #[arg(long, value_name = "TEXT")]
        set: Option<String>,

        /// Insert text (at the end unless --at is given)
        #[arg(long, value_name = "TEXT")]
        insert: Option<String>,

        /// Delete this many characters starting at --at
        #[arg(long, value_name = "LEN", requires = "at")]
        delete: Option<usize>,

        /// Character position for --insert and --delete
        #[arg(long, value_name = "POS")]
        at: Option<usize>,
    },

    /// Resolve a document held in conflict
    #[command(group(ArgGroup::new("choice").required(true).args(["local", "remote", "content"])))]
    Resolve {
        /// Document ID
        id: String,

        /// Keep this client's version
        #[arg(long)]
        local: bool,

        /// Take the remote version
        #[arg(long)]
        remote: bool,

        /// Use this merged content
        #[arg(long, value_name = "TEXT")]
        content: Option<String>,
    },

    /// Inspect and administer queued actions
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Write a JSON snapshot of the local store ("-" for stdout)
    Export {
        /// Output file path
        filepath: String,
    },

    /// Replace the local store from a JSON snapshot ("-" for stdin)
    Import {
        /// Input file path
        filepath: String,
    },

    /// Read and write preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

/// Action queue commands.
#[derive(Subcommand)]
pub enum QueueCommand {
    /// List queued actions in delivery order
    List {
        /// Only actions with this status (pending, processing, failed)
        #[arg(long, short)]
        status: Option<String>,

        #[arg(long, short, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Queue an action for a resource
    #[command(after_help = "Examples:\n  \
        kn queue add update document doc-1 --payload '{\"content\":\"hi\"}'\n  \
        kn queue add delete comment c-9 --priority high")]
    Add {
        /// Action kind (create, update, delete, move, share)
        kind: String,

        /// Resource type (document, collection, workspace, comment)
        resource_type: String,

        /// Resource ID
        resource_id: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Priority (critical, high, normal, low)
        #[arg(long, short, default_value = "normal")]
        priority: String,
    },

    /// Retry a failed action
    Retry {
        /// Action ID
        id: String,
    },

    /// Retry every failed action
    RetryAll,

    /// Delete every failed action
    ClearFailed,
}

/// Preference commands.
#[derive(Subcommand)]
pub enum PrefsCommand {
    /// Print one preference, or all of them
    Get {
        key: Option<String>,
    },

    /// Set a preference (JSON, or a plain string)
    Set {
        key: String,
        value: String,
    },

    /// Remove a preference
    Unset {
        key: String,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
