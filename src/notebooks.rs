//! Notebook management.

use anyhow::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

use crate::error::NotebookError;
use crate::models::{Notebook, NotebookSummary};

fn notebook_from_row(row: &SqliteRow) -> Notebook {
    Notebook {
        id: row.get("id"),
        subject: row.get("subject"),
        created_at: row.get("created_at"),
    }
}

/// Creates a notebook. A blank subject is rejected before any write.
pub async fn create_notebook(pool: &SqlitePool, subject: &str) -> Result<Notebook> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(NotebookError::validation("Name cannot be empty!"));
    }

    let id = sqlx::query("INSERT INTO notebooks (subject, created_at) VALUES (?, datetime('now'))")
        .bind(subject)
        .execute(pool)
        .await?
        .last_insert_rowid();

    info!(notebook = id, subject, "created notebook");
    get_notebook(pool, id).await
}

pub async fn get_notebook(pool: &SqlitePool, id: i64) -> Result<Notebook> {
    let row = sqlx::query("SELECT id, subject, created_at FROM notebooks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(notebook_from_row(&row)),
        None => Err(NotebookError::not_found("Notebook not found")),
    }
}

/// Renames a notebook. Blank names are ignored; returns whether a row changed.
pub async fn rename_notebook(pool: &SqlitePool, id: i64, name: &str) -> Result<bool> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(false);
    }

    let result = sqlx::query("UPDATE notebooks SET subject = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a notebook; materials, sessions, messages and notes cascade.
///
/// Stored files of the notebook's materials are left on disk.
pub async fn delete_notebook(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notebooks WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        info!(notebook = id, "deleted notebook");
    }
    Ok(result.rows_affected() > 0)
}

/// Lists notebooks newest first, each with its material count.
pub async fn list_notebooks(pool: &SqlitePool) -> Result<Vec<NotebookSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT n.id, n.subject, n.created_at,
               (SELECT COUNT(*) FROM materials m WHERE m.notebook_id = n.id) AS material_count
        FROM notebooks n
        ORDER BY n.created_at DESC, n.id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| NotebookSummary {
            id: row.get("id"),
            subject: row.get("subject"),
            created_at: row.get("created_at"),
            material_count: row.get("material_count"),
        })
        .collect())
}
