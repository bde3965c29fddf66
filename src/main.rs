//! # Notebook LM CLI (`nlm`)
//!
//! ## Usage
//!
//! ```bash
//! nlm --config ./config/nlm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nlm init` | Create the SQLite database and run schema migrations |
//! | `nlm serve` | Start the HTTP API |
//! | `nlm reset` | Drop all data and delete uploaded files |
//! | `nlm notebooks` | List notebooks with their material counts |
//!
//! Log verbosity follows `RUST_LOG` (default `notebook_lm=info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use notebook_lm::{app, config, migrate, notebooks, reset, server};

/// Notebook LM: PDFs in notebooks, questions answered from their text.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nlm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nlm",
    about = "Notebook LM: organize PDFs into notebooks and ask grounded questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nlm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the uploads directory.
    ///
    /// Idempotent: only pending migrations are applied.
    Init,

    /// Start the HTTP API at `[server].bind`.
    Serve,

    /// Delete every notebook, message and note, and every uploaded file.
    Reset,

    /// List notebooks, newest first.
    Notebooks,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("notebook_lm=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = app::open_pool(&cfg.db).await?;
            let applied = migrate::run_migrations(&pool).await?;
            std::fs::create_dir_all(&cfg.uploads.dir)?;
            println!(
                "Database initialized successfully. ({} migration(s) applied, schema v{})",
                applied,
                migrate::latest_version()
            );
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Reset => {
            let pool = app::open_pool(&cfg.db).await?;
            reset::reset_database(&pool).await?;
            let report = reset::clear_uploads(&cfg.uploads.dir).await?;
            println!("Database and uploads reset successfully!");
            if report.failed > 0 {
                println!("{} uploaded file(s) could not be removed.", report.failed);
            }
        }
        Commands::Notebooks => {
            let pool = app::open_pool(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            let listing = notebooks::list_notebooks(&pool).await?;
            if listing.is_empty() {
                println!("No notebooks.");
                return Ok(());
            }
            println!(
                "{:<6} {:<32} {:>9}  {}",
                "ID", "SUBJECT", "MATERIALS", "CREATED"
            );
            for nb in listing {
                println!(
                    "{:<6} {:<32} {:>9}  {}",
                    nb.id, nb.subject, nb.material_count, nb.created_at
                );
            }
        }
    }

    Ok(())
}
