//! Versioned schema migrations.
//!
//! Applied steps are recorded in `schema_version`; each pending step runs
//! once, in order, inside its own transaction.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS notebooks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS materials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                notebook_id INTEGER NOT NULL,
                pdf_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                FOREIGN KEY (notebook_id) REFERENCES notebooks(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                notebook_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                is_user INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (notebook_id) REFERENCES notebooks(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                notebook_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (notebook_id) REFERENCES notebooks(id) ON DELETE CASCADE
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_materials_notebook ON materials(notebook_id)",
            "CREATE INDEX IF NOT EXISTS idx_chats_notebook ON chats(notebook_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_notes_notebook ON notes(notebook_id, created_at DESC)",
        ],
    },
    Migration {
        version: 2,
        name: "chat_sessions",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                notebook_id INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT 'New Chat',
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                FOREIGN KEY (notebook_id) REFERENCES notebooks(id) ON DELETE CASCADE
            )
            "#,
            "ALTER TABLE chats ADD COLUMN session_id TEXT REFERENCES chat_sessions(id) ON DELETE CASCADE",
            // Chat written before sessions existed becomes one session per notebook.
            r#"
            INSERT INTO chat_sessions (id, notebook_id, title, created_at, last_activity)
            SELECT 'legacy_' || notebook_id,
                   notebook_id,
                   'Previous Chat',
                   COALESCE(MIN(created_at), datetime('now')),
                   COALESCE(MAX(created_at), datetime('now'))
            FROM chats
            WHERE session_id IS NULL AND notebook_id IS NOT NULL
            GROUP BY notebook_id
            "#,
            "UPDATE chats SET session_id = 'legacy_' || notebook_id WHERE session_id IS NULL",
            "CREATE INDEX IF NOT EXISTS idx_chats_session ON chats(session_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_notebook ON chat_sessions(notebook_id, last_activity DESC)",
        ],
    },
];

/// Latest schema version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Applies every pending migration and returns how many were applied.
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "migration {} ({}) failed",
                        migration.version, migration.name
                    )
                })?;
        }
        sqlx::query(
            "INSERT INTO schema_version (version, name, applied_at) VALUES (?, ?, datetime('now'))",
        )
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}

pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_pool;

    #[tokio::test]
    async fn migrations_apply_once() {
        let (_tmp, pool) = temp_pool().await;
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());
        assert_eq!(run_migrations(&pool).await.unwrap(), 0);
        assert_eq!(current_version(&pool).await.unwrap(), latest_version());
    }

    #[tokio::test]
    async fn legacy_chat_is_moved_into_a_session() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::testutil::raw_pool(&tmp).await;

        // Build a database at version 1 only, with sessionless chat rows.
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for statement in MIGRATIONS[0].statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        sqlx::query("INSERT INTO schema_version VALUES (1, 'initial', datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notebooks (subject, created_at) VALUES ('Old', '2024-01-01 10:00:00')")
            .execute(&pool)
            .await
            .unwrap();
        for (msg, is_user, ts) in [
            ("hello", 1, "2024-01-01 10:01:00"),
            ("hi there", 0, "2024-01-01 10:02:00"),
        ] {
            sqlx::query(
                "INSERT INTO chats (notebook_id, message, is_user, created_at) VALUES (1, ?, ?, ?)",
            )
            .bind(msg)
            .bind(is_user)
            .bind(ts)
            .execute(&pool)
            .await
            .unwrap();
        }

        assert_eq!(run_migrations(&pool).await.unwrap(), 1);

        let (title, created, last): (String, String, String) = sqlx::query_as(
            "SELECT title, created_at, last_activity FROM chat_sessions WHERE id = 'legacy_1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(title, "Previous Chat");
        assert_eq!(created, "2024-01-01 10:01:00");
        assert_eq!(last, "2024-01-01 10:02:00");

        let orphans: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE session_id IS NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(orphans, 0);
    }
}
