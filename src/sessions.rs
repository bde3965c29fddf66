//! Chat session lifecycle.
//!
//! A session starts as `New Chat`, is renamed automatically by its first
//! user message (or explicitly on request), and is deleted together with
//! its messages. Session ids are opaque, time-derived tokens.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

use crate::error::NotebookError;
use crate::models::ChatSession;
use crate::notebooks::get_notebook;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// How session ids are minted.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionIdStrategy {
    /// Timestamp plus a random suffix; never collides.
    #[default]
    Unique,
    /// Timestamp at second resolution only. Two sessions created for the
    /// same notebook within one second collide and the second one fails.
    Timestamp,
}

impl SessionIdStrategy {
    pub fn generate(self, notebook_id: i64, now: DateTime<Utc>) -> String {
        let stamp = now.format("%Y%m%d%H%M%S");
        match self {
            SessionIdStrategy::Timestamp => format!("nb{}_{}", notebook_id, stamp),
            SessionIdStrategy::Unique => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                format!("nb{}_{}_{}", notebook_id, stamp, &suffix[..8])
            }
        }
    }
}

/// Title derived from a first message: at most `max_chars` characters,
/// followed by `...` when the message was longer.
pub fn session_title_from_message(message: &str, max_chars: usize) -> String {
    let message = message.trim();
    if message.chars().count() > max_chars {
        let head: String = message.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

fn session_from_row(row: &SqliteRow) -> ChatSession {
    ChatSession {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        last_activity: row.get("last_activity"),
    }
}

pub async fn create_session(
    pool: &SqlitePool,
    notebook_id: i64,
    strategy: SessionIdStrategy,
) -> Result<ChatSession> {
    create_session_at(pool, notebook_id, strategy, Utc::now()).await
}

/// Creates a session whose id is derived from `now`.
///
/// Fails with [`NotebookError::Conflict`] when the id is already taken.
pub async fn create_session_at(
    pool: &SqlitePool,
    notebook_id: i64,
    strategy: SessionIdStrategy,
    now: DateTime<Utc>,
) -> Result<ChatSession> {
    get_notebook(pool, notebook_id).await?;
    let id = strategy.generate(notebook_id, now);

    let inserted = sqlx::query(
        "INSERT INTO chat_sessions (id, notebook_id, title, created_at, last_activity) VALUES (?, ?, ?, datetime('now'), datetime('now'))",
    )
    .bind(&id)
    .bind(notebook_id)
    .bind(DEFAULT_SESSION_TITLE)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(NotebookError::Conflict(format!("chat session {} already exists", id)).into());
        }
        Err(e) => return Err(e.into()),
    }

    info!(notebook = notebook_id, session = %id, "created chat session");
    get_session(pool, &id).await
}

pub async fn get_session(pool: &SqlitePool, id: &str) -> Result<ChatSession> {
    let row = sqlx::query(
        "SELECT id, notebook_id, title, created_at, last_activity FROM chat_sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(session_from_row(&row)),
        None => Err(NotebookError::not_found("Chat session not found")),
    }
}

/// Returns the requested session if it belongs to the notebook, otherwise
/// a freshly created one.
pub async fn resolve_session(
    pool: &SqlitePool,
    notebook_id: i64,
    requested: Option<&str>,
    strategy: SessionIdStrategy,
) -> Result<ChatSession> {
    if let Some(id) = requested.filter(|id| !id.is_empty()) {
        let row = sqlx::query(
            "SELECT id, notebook_id, title, created_at, last_activity FROM chat_sessions WHERE id = ? AND notebook_id = ?",
        )
        .bind(id)
        .bind(notebook_id)
        .fetch_optional(pool)
        .await?;

        if let Some(row) = row {
            return Ok(session_from_row(&row));
        }
    }

    create_session(pool, notebook_id, strategy).await
}

/// Lists a notebook's sessions, most recently active first.
pub async fn list_sessions(pool: &SqlitePool, notebook_id: i64) -> Result<Vec<ChatSession>> {
    let rows = sqlx::query(
        "SELECT id, notebook_id, title, created_at, last_activity FROM chat_sessions WHERE notebook_id = ? ORDER BY last_activity DESC, created_at DESC, rowid DESC",
    )
    .bind(notebook_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(session_from_row).collect())
}

pub async fn rename_session(pool: &SqlitePool, id: &str, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(NotebookError::validation("Title cannot be empty"));
    }

    let result = sqlx::query("UPDATE chat_sessions SET title = ? WHERE id = ?")
        .bind(title)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotebookError::not_found("Chat session not found"));
    }
    Ok(())
}

/// Deletes a session; its messages cascade.
pub async fn delete_session(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotebookError::not_found("Chat session not found"));
    }
    info!(session = id, "deleted chat session");
    Ok(())
}

/// Marks a session as active now.
pub async fn touch_session(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE chat_sessions SET last_activity = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Names an untitled session after its first user message.
///
/// Returns the new title when a rename happened. Sessions that already
/// carry user messages, or that were renamed explicitly, keep their title.
pub async fn auto_title(
    pool: &SqlitePool,
    session: &ChatSession,
    first_message: &str,
    max_chars: usize,
) -> Result<Option<String>> {
    if session.title != DEFAULT_SESSION_TITLE {
        return Ok(None);
    }

    let user_messages: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE session_id = ? AND is_user = 1")
            .bind(&session.id)
            .fetch_one(pool)
            .await?;
    if user_messages > 0 {
        return Ok(None);
    }

    let title = session_title_from_message(first_message, max_chars);
    sqlx::query("UPDATE chat_sessions SET title = ? WHERE id = ?")
        .bind(&title)
        .bind(&session.id)
        .execute(pool)
        .await?;
    Ok(Some(title))
}
