//! Free-text notes attached to a notebook.
//!
//! Note content is stored and returned as written; it is never rendered.

use anyhow::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

use crate::error::NotebookError;
use crate::models::{Note, NoteSummary};
use crate::notebooks::get_notebook;

pub const DEFAULT_NOTE_TITLE: &str = "Untitled Note";

fn note_from_row(row: &SqliteRow) -> Note {
    Note {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

fn title_or_default(title: Option<&str>) -> &str {
    match title {
        Some(t) if !t.is_empty() => t,
        _ => DEFAULT_NOTE_TITLE,
    }
}

pub async fn create_note(
    pool: &SqlitePool,
    notebook_id: i64,
    title: Option<&str>,
    content: Option<&str>,
) -> Result<Note> {
    get_notebook(pool, notebook_id).await?;

    let id = sqlx::query(
        "INSERT INTO notes (notebook_id, title, content, created_at) VALUES (?, ?, ?, datetime('now'))",
    )
    .bind(notebook_id)
    .bind(title_or_default(title))
    .bind(content.unwrap_or(""))
    .execute(pool)
    .await?
    .last_insert_rowid();

    info!(notebook = notebook_id, note = id, "created note");
    get_note(pool, id).await
}

/// Lists a notebook's notes, newest first, without their content.
pub async fn list_notes(pool: &SqlitePool, notebook_id: i64) -> Result<Vec<NoteSummary>> {
    let rows = sqlx::query(
        "SELECT id, title, created_at FROM notes WHERE notebook_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(notebook_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| NoteSummary {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn get_note(pool: &SqlitePool, id: i64) -> Result<Note> {
    let row = sqlx::query(
        "SELECT id, notebook_id, title, content, created_at FROM notes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(note_from_row(&row)),
        None => Err(NotebookError::not_found("Note not found")),
    }
}

/// Replaces a note's title and content wholesale.
pub async fn update_note(
    pool: &SqlitePool,
    id: i64,
    title: Option<&str>,
    content: Option<&str>,
) -> Result<Note> {
    let result = sqlx::query("UPDATE notes SET title = ?, content = ? WHERE id = ?")
        .bind(title_or_default(title))
        .bind(content.unwrap_or(""))
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotebookError::not_found("Note not found"));
    }
    get_note(pool, id).await
}

/// Deletes a note; returns whether it existed.
pub async fn delete_note(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebooks::create_notebook;
    use crate::testutil::temp_pool;

    #[tokio::test]
    async fn missing_title_defaults_and_content_is_kept_verbatim() {
        let (_tmp, pool) = temp_pool().await;
        let nb = create_notebook(&pool, "Biology").await.unwrap();

        let note = create_note(&pool, nb.id, None, Some("**not rendered**"))
            .await
            .unwrap();
        assert_eq!(note.title, DEFAULT_NOTE_TITLE);
        assert_eq!(note.content, "**not rendered**");

        let blank = create_note(&pool, nb.id, Some(""), None).await.unwrap();
        assert_eq!(blank.title, DEFAULT_NOTE_TITLE);
        assert_eq!(blank.content, "");
    }

    #[tokio::test]
    async fn notes_list_newest_first() {
        let (_tmp, pool) = temp_pool().await;
        let nb = create_notebook(&pool, "Biology").await.unwrap();

        create_note(&pool, nb.id, Some("Cells"), None).await.unwrap();
        create_note(&pool, nb.id, Some("Genes"), None).await.unwrap();

        let titles: Vec<String> = list_notes(&pool, nb.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["Genes", "Cells"]);
    }

    #[tokio::test]
    async fn update_replaces_both_fields() {
        let (_tmp, pool) = temp_pool().await;
        let nb = create_notebook(&pool, "Biology").await.unwrap();
        let note = create_note(&pool, nb.id, Some("Cells"), Some("mitosis"))
            .await
            .unwrap();

        let updated = update_note(&pool, note.id, None, Some("meiosis"))
            .await
            .unwrap();
        assert_eq!(updated.title, DEFAULT_NOTE_TITLE);
        assert_eq!(updated.content, "meiosis");
        assert_eq!(updated.created_at, note.created_at);
    }

    #[tokio::test]
    async fn unknown_notes_and_notebooks_are_not_found() {
        let (_tmp, pool) = temp_pool().await;

        let err = create_note(&pool, 99, Some("x"), None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NotebookError>(),
            Some(NotebookError::NotFound(_))
        ));

        let err = get_note(&pool, 5).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<NotebookError>(),
            Some(&NotebookError::NotFound("Note not found".into()))
        );
        assert!(update_note(&pool, 5, None, None).await.is_err());
        assert!(!delete_note(&pool, 5).await.unwrap());
    }
}
