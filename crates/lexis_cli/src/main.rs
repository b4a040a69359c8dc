//! Lexis CLI
//!
//! Command-line client for a local Lexis store and its sync API.
//!
//! # Commands
//!
//! - `add`, `edit`, `delete` - Mutate words in the local store
//! - `list` - Show the records of the selected stream
//! - `status` - Show sync status counts and cursors of every stream
//! - `push`, `pull`, `sync` - Run sync jobs against the remote API
//! - `reset-cursor` - Forget pull progress so the next pull starts over

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::Context;
use lexis_sync_protocol::SyncStream;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Output format of read commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Lexis vocabulary store and sync client.
#[derive(Parser)]
#[command(name = "lexis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store file
    #[arg(global = true, short, long, env = "LEXIS_STORE", default_value = "lexis.json")]
    store: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Base URL of the sync API
    #[arg(global = true, long, env = "LEXIS_API_URL")]
    api_url: Option<String>,

    /// API key sent as x-api-key
    #[arg(global = true, long, env = "LEXIS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Secret key sent as x-secret-key
    #[arg(global = true, long, env = "LEXIS_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Record stream for list, push, pull and sync (words, categories, note_categories)
    #[arg(global = true, long, default_value = "words")]
    stream: SyncStream,

    /// Treat the network as unavailable
    #[arg(global = true, long)]
    offline: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a word
    Add {
        /// The word itself
        word: String,

        /// Short meaning
        #[arg(short, long, default_value = "")]
        meaning: String,

        /// Longer explanation
        #[arg(short, long, default_value = "")]
        details: String,

        /// Usage examples
        #[arg(short, long, default_value = "")]
        examples: String,

        /// Mark as favorite
        #[arg(long)]
        favorite: bool,

        /// Push right after saving
        #[arg(long)]
        push: bool,
    },

    /// Edit a word
    Edit {
        /// uid of the word
        uid: String,

        /// New spelling
        #[arg(short, long)]
        word: Option<String>,

        /// New short meaning
        #[arg(short, long)]
        meaning: Option<String>,

        /// New explanation
        #[arg(short, long)]
        details: Option<String>,

        /// New usage examples
        #[arg(short, long)]
        examples: Option<String>,

        /// Set or clear the favorite flag
        #[arg(long)]
        favorite: Option<bool>,

        /// New proficiency level
        #[arg(long)]
        proficiency: Option<String>,

        /// Push right after saving
        #[arg(long)]
        push: bool,
    },

    /// Delete a word
    Delete {
        /// uid of the word
        uid: String,

        /// Remove the row instead of syncing a tombstone
        #[arg(long)]
        hard: bool,

        /// Push right after deleting
        #[arg(long)]
        push: bool,
    },

    /// List the records of the selected stream
    List {
        /// Only show records waiting to be pushed, tombstones included
        #[arg(short, long)]
        pending: bool,
    },

    /// Show sync status
    Status,

    /// Upload local changes
    Push,

    /// Download remote changes
    Pull,

    /// Push, then pull
    Sync,

    /// Forget pull progress for every stream
    ResetCursor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::open(
        &cli.store,
        commands::Remote {
            api_url: cli.api_url,
            api_key: cli.api_key,
            secret_key: cli.secret_key,
            stream: cli.stream,
            offline: cli.offline,
        },
        cli.format,
    )?;

    match cli.command {
        Commands::Add {
            word,
            meaning,
            details,
            examples,
            favorite,
            push,
        } => {
            let fields = commands::add::NewWord {
                word,
                meaning,
                details,
                examples,
                favorite,
            };
            commands::add::run(&ctx, fields, push).await?;
        }
        Commands::Edit {
            uid,
            word,
            meaning,
            details,
            examples,
            favorite,
            proficiency,
            push,
        } => {
            let changes = commands::edit::WordChanges {
                word,
                meaning,
                details,
                examples,
                favorite,
                proficiency,
            };
            commands::edit::run(&ctx, &uid, changes, push).await?;
        }
        Commands::Delete { uid, hard, push } => {
            commands::delete::run(&ctx, &uid, hard, push).await?;
        }
        Commands::List { pending } => {
            commands::list::run(&ctx, pending)?;
        }
        Commands::Status => {
            commands::status::run(&ctx)?;
        }
        Commands::Push => {
            commands::sync::push(&ctx).await?;
        }
        Commands::Pull => {
            commands::sync::pull(&ctx).await?;
        }
        Commands::Sync => {
            commands::sync::sync(&ctx).await?;
        }
        Commands::ResetCursor => {
            commands::reset_cursor::run(&ctx)?;
        }
    }

    Ok(())
}
