//! # Contact Mirror CLI (`cmirror`)
//!
//! ## Usage
//!
//! ```bash
//! cmirror --config ./config/cmirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cmirror init` | Create the SQLite database and run schema migrations |
//! | `cmirror sync` | Pull changes from the remote address book |
//! | `cmirror status` | Show sync phase, last error, and contact totals |
//! | `cmirror search "<query>"` | Search mirrored contacts |
//! | `cmirror get <id>` | Show one contact with all numbers and emails |
//! | `cmirror directory root` | Print the phone directory XML |
//! | `cmirror serve` | Start the HTTP server |
//!
//! Logs go to stderr (`RUST_LOG` overrides `--log-level`), so command output
//! on stdout stays clean for scripts.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use contact_mirror::directory::DirectoryTarget;
use contact_mirror::{config, directory, get, migrate, search, server, status, sync};
use contact_mirror_core::keypad::GroupKey;
use contact_mirror_core::models::SyncMode;

/// Contact Mirror CLI: mirrors a remote address book into SQLite and
/// serves it to IP phones and search clients.
#[derive(Parser)]
#[command(
    name = "cmirror",
    about = "Contact Mirror: a local contact replica served as an IP-phone directory and search API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cmirror.toml")]
    config: PathBuf,

    /// Log level for this crate when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Safe to run against an existing database.
    Init,

    /// Sync contacts from the remote provider.
    ///
    /// Without flags, runs incrementally when a sync token is stored and a
    /// full sync otherwise.
    Sync {
        /// Re-list every contact instead of fetching changes.
        #[arg(long, conflicts_with = "incremental")]
        full: bool,

        /// Fetch only changes since the last sync (falls back to full when no
        /// token is stored).
        #[arg(long)]
        incremental: bool,
    },

    /// Show the current sync state.
    Status,

    /// Search contacts by name, email, or phone number.
    Search {
        /// The search query (at least 2 characters).
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one contact by its local id.
    Get {
        /// Contact UUID.
        id: String,
    },

    /// Print directory XML exactly as a phone would receive it.
    Directory {
        #[command(subcommand)]
        view: DirectoryView,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum DirectoryView {
    /// The root menu of keypad groups.
    Root,
    /// Contacts in one group (`2ABC`, `2`, `#`, ...).
    Group { key: String },
    /// Phone numbers of one contact.
    Contact { id: String },
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "contact_mirror={log_level},contact_mirror_core={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { full, incremental } => {
            let mode = if full {
                SyncMode::Full
            } else if incremental {
                SyncMode::Incremental
            } else {
                SyncMode::Auto
            };
            sync::run_sync_command(&cfg, mode).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Directory { view } => {
            let target = match view {
                DirectoryView::Root => DirectoryTarget::Root,
                DirectoryView::Group { key } => DirectoryTarget::Group(key.parse::<GroupKey>()?),
                DirectoryView::Contact { id } => DirectoryTarget::Contact(id),
            };
            directory::run_directory(&cfg, target).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
