//! Process-wide handles shared by every operation.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, DbConfig};
use crate::generate::{create_generator, Generator};
use crate::migrate;

/// Database pool, configuration and generator, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub generator: Arc<dyn Generator>,
}

impl AppContext {
    /// Connects, applies pending migrations and builds the configured generator.
    pub async fn open(config: Config) -> Result<Self> {
        let generator = create_generator(&config.llm)?;
        Self::open_with_generator(config, generator).await
    }

    /// Like [`AppContext::open`], with a caller-supplied generator.
    pub async fn open_with_generator(
        config: Config,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let pool = open_pool(&config.db).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            config: Arc::new(config),
            generator,
        })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.config.uploads.dir
    }
}

/// Opens the notebook database, creating the file and its directory on
/// first use. Cascading deletes rely on `foreign_keys`.
pub async fn open_pool(db: &DbConfig) -> Result<SqlitePool> {
    if let Some(parent) = db.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(&db.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db.path.display()))?;

    debug!(path = %db.path.display(), "database pool opened");
    Ok(pool)
}
