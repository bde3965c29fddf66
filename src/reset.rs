//! Administrative wipe of the database and the uploads directory.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

use crate::migrate::run_migrations;

/// Tables in drop order (children before parents).
const TABLES: &[&str] = &[
    "chats",
    "chat_sessions",
    "notes",
    "materials",
    "notebooks",
    "schema_version",
];

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

/// Drops every table and recreates an empty schema.
pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    for table in TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }
    run_migrations(pool).await?;
    info!("database reset");
    Ok(())
}

/// Removes the regular files directly inside `dir`.
///
/// A missing directory is created. Files that cannot be removed are logged
/// and counted, never fatal.
pub async fn clear_uploads(dir: &Path) -> Result<ClearReport> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await?;
        return Ok(ClearReport::default());
    }

    let mut report = ClearReport::default();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => {}
            _ => continue,
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not remove upload");
                report.failed += 1;
            }
        }
    }

    info!(removed = report.removed, failed = report.failed, "uploads cleared");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{current_version, latest_version};
    use crate::notebooks::{create_notebook, list_notebooks};
    use crate::testutil::temp_pool;

    #[tokio::test]
    async fn reset_leaves_an_empty_current_schema() {
        let (_tmp, pool) = temp_pool().await;
        create_notebook(&pool, "Physics").await.unwrap();

        reset_database(&pool).await.unwrap();

        assert!(list_notebooks(&pool).await.unwrap().is_empty());
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());
        // Ids start over after the drop.
        assert_eq!(create_notebook(&pool, "Again").await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn clear_removes_files_but_not_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("b.pdf"), b"b").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        let report = clear_uploads(tmp.path()).await.unwrap();
        assert_eq!(report, ClearReport { removed: 2, failed: 0 });
        assert!(tmp.path().join("nested").is_dir());
        assert!(!tmp.path().join("a.pdf").exists());
    }

    #[tokio::test]
    async fn clear_creates_a_missing_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("uploads");
        let report = clear_uploads(&dir).await.unwrap();
        assert_eq!(report, ClearReport::default());
        assert!(dir.is_dir());
    }
}
