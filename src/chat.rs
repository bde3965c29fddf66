//! Asking questions and reading chat history.
//!
//! A chat turn appends exactly two rows to the session: the user's
//! question and the generated reply (or the error text that replaced it).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::info;

use crate::app::AppContext;
use crate::error::NotebookError;
use crate::extract::{build_context, SkippedMaterial};
use crate::generate::{answer, build_prompt};
use crate::materials::list_materials;
use crate::models::{ChatMessage, ChatSession};
use crate::notebooks::get_notebook;
use crate::render::format_ai_response;
use crate::selection::{parse_selected_sources, SourceSelection};
use crate::sessions::{auto_title, get_session, resolve_session, touch_session};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub selected_sources: Option<SourceSelection>,
}

/// A stored message plus its rendered HTML (replies only).
#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub html: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub session: ChatSession,
    pub question: ChatEntry,
    pub reply: ChatEntry,
    /// Materials the question was grounded on.
    pub selected_sources: Vec<i64>,
    pub skipped_sources: Vec<SkippedMaterial>,
    pub generation_failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub session: ChatSession,
    pub messages: Vec<ChatEntry>,
}

fn message_from_row(row: &SqliteRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        session_id: row.get("session_id"),
        message: row.get("message"),
        is_user: row.get("is_user"),
        created_at: row.get("created_at"),
    }
}

/// Appends one message to a session.
pub async fn insert_message(
    pool: &SqlitePool,
    notebook_id: i64,
    session_id: &str,
    text: &str,
    is_user: bool,
) -> Result<ChatMessage> {
    let id = sqlx::query(
        "INSERT INTO chats (notebook_id, session_id, message, is_user, created_at) VALUES (?, ?, ?, ?, datetime('now'))",
    )
    .bind(notebook_id)
    .bind(session_id)
    .bind(text)
    .bind(is_user)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let row = sqlx::query(
        "SELECT id, notebook_id, session_id, message, is_user, created_at FROM chats WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(message_from_row(&row))
}

/// Messages of a session in the order they were written.
pub async fn session_messages(pool: &SqlitePool, session_id: &str) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        "SELECT id, notebook_id, session_id, message, is_user, created_at FROM chats WHERE session_id = ? ORDER BY created_at, id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(message_from_row).collect())
}

/// An empty selection stands for every material of the notebook.
pub async fn effective_selection(
    pool: &SqlitePool,
    notebook_id: i64,
    selected: Vec<i64>,
) -> Result<Vec<i64>> {
    if !selected.is_empty() {
        return Ok(selected);
    }
    Ok(list_materials(pool, notebook_id)
        .await?
        .iter()
        .map(|m| m.id)
        .collect())
}

fn to_entry(ctx: &AppContext, message: ChatMessage) -> ChatEntry {
    let html = (!message.is_user)
        .then(|| format_ai_response(&message.message, ctx.config.render.mode));
    ChatEntry { message, html }
}

/// Runs one chat turn against a notebook.
pub async fn ask(ctx: &AppContext, notebook_id: i64, request: &AskRequest) -> Result<AskOutcome> {
    let pool = &ctx.pool;
    get_notebook(pool, notebook_id).await?;

    let selected = parse_selected_sources(request.selected_sources.as_ref())?;

    let question = request.message.trim();
    if question.is_empty() {
        return Err(NotebookError::validation("Message cannot be empty"));
    }

    let selected = effective_selection(pool, notebook_id, selected).await?;

    let strategy = ctx.config.chat.session_ids;
    let session = resolve_session(pool, notebook_id, request.session_id.as_deref(), strategy).await?;

    auto_title(pool, &session, question, ctx.config.chat.title_max_chars).await?;
    let user_message = insert_message(pool, notebook_id, &session.id, question, true).await?;
    touch_session(pool, &session.id).await?;

    let context = build_context(pool, ctx.uploads_dir(), notebook_id, &selected).await?;
    let prompt = build_prompt(&context.text, question);
    let reply = answer(ctx.generator.as_ref(), &prompt).await;

    let ai_message = insert_message(pool, notebook_id, &session.id, &reply.text, false).await?;
    touch_session(pool, &session.id).await?;

    info!(
        notebook = notebook_id,
        session = %session.id,
        sources = context.included.len(),
        skipped = context.skipped.len(),
        failed = reply.failed,
        "answered question"
    );

    Ok(AskOutcome {
        session: get_session(pool, &session.id).await?,
        question: to_entry(ctx, user_message),
        reply: to_entry(ctx, ai_message),
        selected_sources: selected,
        skipped_sources: context.skipped,
        generation_failed: reply.failed,
    })
}

/// A session of a notebook with its rendered messages.
///
/// A missing or foreign session id yields a fresh, empty session.
pub async fn history(
    ctx: &AppContext,
    notebook_id: i64,
    requested: Option<&str>,
) -> Result<ChatView> {
    get_notebook(&ctx.pool, notebook_id).await?;
    let session = resolve_session(&ctx.pool, notebook_id, requested, ctx.config.chat.session_ids)
        .await?;
    let messages = session_messages(&ctx.pool, &session.id)
        .await?
        .into_iter()
        .map(|m| to_entry(ctx, m))
        .collect();
    Ok(ChatView { session, messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{ingest_uploads, UploadedFile};
    use crate::notebooks::create_notebook;
    use crate::sessions::DEFAULT_SESSION_TITLE;
    use crate::testutil::{minimal_pdf_with_text, temp_context};

    #[tokio::test]
    async fn empty_selection_grounds_on_every_material() {
        let (_tmp, ctx, generator) = temp_context().await;
        let nb = create_notebook(&ctx.pool, "Physics").await.unwrap();
        let report = ingest_uploads(
            &ctx.pool,
            ctx.uploads_dir(),
            nb.id,
            vec![UploadedFile {
                file_name: Some("notes.pdf".into()),
                bytes: minimal_pdf_with_text("kinematics and momentum"),
            }],
        )
        .await
        .unwrap();

        let outcome = ask(
            &ctx,
            nb.id,
            &AskRequest {
                message: "What is covered?".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.selected_sources, vec![report.stored[0].id]);
        assert!(!outcome.generation_failed);
        let prompt = generator.last_prompt().unwrap();
        assert!(prompt.contains("kinematics and momentum"));
        assert!(prompt.contains("Question: What is covered?"));

        let messages = session_messages(&ctx.pool, &outcome.session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_user);
        assert_eq!(messages[0].message, "What is covered?");
        assert!(!messages[1].is_user);
        assert!(messages[0].id < messages[1].id);
        assert!(outcome.reply.html.is_some());
        assert!(outcome.question.html.is_none());
    }

    #[tokio::test]
    async fn first_message_names_the_session_and_later_ones_do_not() {
        let (_tmp, ctx, _generator) = temp_context().await;
        let nb = create_notebook(&ctx.pool, "History").await.unwrap();
        let long_question = "Explain the causes of the fall of the Western Roman Empire in detail";

        let first = ask(
            &ctx,
            nb.id,
            &AskRequest {
                message: long_question.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let expected: String = long_question.chars().take(50).collect::<String>() + "...";
        assert_eq!(first.session.title, expected);

        let second = ask(
            &ctx,
            nb.id,
            &AskRequest {
                message: "And the Eastern one?".into(),
                session_id: Some(first.session.id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(second.session.id, first.session.id);
        assert_eq!(second.session.title, expected);
        assert!(second.session.last_activity >= first.session.last_activity);
        assert_eq!(
            session_messages(&ctx.pool, &first.session.id)
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn blank_question_and_bad_selection_write_nothing() {
        let (_tmp, ctx, _generator) = temp_context().await;
        let nb = create_notebook(&ctx.pool, "Math").await.unwrap();

        let err = ask(&ctx, nb.id, &AskRequest::default()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NotebookError>(),
            Some(NotebookError::Validation(_))
        ));

        let err = ask(
            &ctx,
            nb.id,
            &AskRequest {
                message: "hi".into(),
                selected_sources: Some(SourceSelection::Text("1,abc".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<NotebookError>(),
            Some(&NotebookError::InvalidSelection("abc".into()))
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn history_starts_a_fresh_session_when_none_is_given() {
        let (_tmp, ctx, _generator) = temp_context().await;
        let nb = create_notebook(&ctx.pool, "Art").await.unwrap();

        let view = history(&ctx, nb.id, None).await.unwrap();
        assert_eq!(view.session.title, DEFAULT_SESSION_TITLE);
        assert!(view.messages.is_empty());

        let reopened = history(&ctx, nb.id, Some(&view.session.id)).await.unwrap();
        assert_eq!(reopened.session.id, view.session.id);
    }
}
