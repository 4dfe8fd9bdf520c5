//! # Rainbow Intel CLI (`rbi`)
//!
//! ## Usage
//!
//! ```bash
//! rbi --config ./config/rbi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rbi init` | Create the SQLite database and run schema migrations |
//! | `rbi bridge create <name>` | Register a bridge and print its token |
//! | `rbi bridge list` | List bridges with message counts |
//! | `rbi bridge enable\|disable <id>` | Toggle the intelligence layer |
//! | `rbi bridge delete <id>` | Delete a bridge and its history |
//! | `rbi ingest <id> <text>` | Add a message by hand (platform `api`) |
//! | `rbi ask <id> <question>` | Ask a question about the bridge history |
//! | `rbi history <id>` | Browse stored messages, newest first |
//! | `rbi stats <id>` | Totals and per-platform breakdown |
//! | `rbi serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rainbow_intel::{ask, bridges, config, history, ingest_cmd, logging, migrate, server, stats};

/// Rainbow Intel — retrieval-augmented answers over Slack ↔ Teams bridge history.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rbi.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "rbi", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rbi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage bridges (tenants).
    Bridge {
        #[command(subcommand)]
        action: BridgeAction,
    },

    /// Ingest one message into a bridge, retrying transient embedding failures.
    Ingest {
        bridge_id: String,
        text: String,
        /// Sender name recorded with the message.
        #[arg(long, default_value = "operator")]
        sender: String,
        /// Retries for rate-limited or unavailable providers (backoff 1s, 2s, 4s, … max 32s).
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },

    /// Ask a question grounded on a bridge's history.
    Ask {
        bridge_id: String,
        question: String,
        /// Number of messages to retrieve (defaults to `[retrieval] k`).
        #[arg(long)]
        k: Option<usize>,
        /// Print the answer as it is generated, without sources.
        #[arg(long)]
        stream: bool,
    },

    /// Show a page of stored messages, newest first.
    History {
        bridge_id: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        /// Defaults to `[history] default_page_size`.
        #[arg(long)]
        page_size: Option<i64>,
    },

    /// Show message totals for a bridge.
    Stats { bridge_id: String },

    /// Start the HTTP server on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum BridgeAction {
    /// Register a new bridge and print its bearer token.
    Create { name: String },
    /// List bridges.
    List,
    /// Enable the intelligence layer for a bridge.
    Enable { id: String },
    /// Disable the intelligence layer; the relay is then rejected.
    Disable { id: String },
    /// Delete a bridge and all of its messages.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Bridge { action } => match action {
            BridgeAction::Create { name } => bridges::run_create(&cfg, &name).await?,
            BridgeAction::List => bridges::run_list(&cfg).await?,
            BridgeAction::Enable { id } => bridges::run_set_intelligence(&cfg, &id, true).await?,
            BridgeAction::Disable { id } => bridges::run_set_intelligence(&cfg, &id, false).await?,
            BridgeAction::Delete { id } => bridges::run_delete(&cfg, &id).await?,
        },
        Commands::Ingest {
            bridge_id,
            text,
            sender,
            retries,
        } => {
            ingest_cmd::run_ingest(&cfg, &bridge_id, &text, &sender, retries).await?;
        }
        Commands::Ask {
            bridge_id,
            question,
            k,
            stream,
        } => {
            ask::run_ask(&cfg, &bridge_id, &question, k, stream).await?;
        }
        Commands::History {
            bridge_id,
            page,
            page_size,
        } => {
            history::run_history(&cfg, &bridge_id, page, page_size).await?;
        }
        Commands::Stats { bridge_id } => {
            stats::run_stats(&cfg, &bridge_id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
