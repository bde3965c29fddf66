//! Material ingestion and management.
//!
//! Uploaded PDFs are written to a shared uploads directory under a sanitized
//! name and recorded in `materials` together with the original display name.
//! Two uploads with the same sanitized name share one file on disk; the later
//! write replaces the earlier one.

use anyhow::Result;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::path::Path;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::NotebookError;
use crate::models::Material;
use crate::notebooks::get_notebook;

/// A file received from an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client, if any.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedUpload {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of one upload request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub stored: Vec<Material>,
    pub skipped: Vec<SkippedUpload>,
}

/// Result of a best-effort file removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed,
    Missing,
    Failed(String),
}

/// Whether a file name carries a `.pdf` extension, ignoring case.
pub fn is_pdf_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

/// Reduces a client-supplied file name to a safe single path component.
///
/// Accented letters are folded to their NFKD base letters and any other
/// non-ASCII characters are dropped. Path separators become spaces, runs of
/// whitespace become a single `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed, and leading/trailing `.` and `_` are stripped. The result may be
/// empty.
pub fn sanitize_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c == '_')
        .to_string()
}

fn material_from_row(row: &SqliteRow) -> Material {
    Material {
        id: row.get("id"),
        notebook_id: row.get("notebook_id"),
        pdf_path: row.get("pdf_path"),
        file_name: row.get("file_name"),
        uploaded_at: row.get("uploaded_at"),
    }
}

/// Stores every acceptable PDF of an upload and records a row for each.
///
/// Files without a `.pdf` name, with a name that sanitizes to nothing, or
/// that cannot be written are skipped and logged; the rest still go through.
pub async fn ingest_uploads(
    pool: &SqlitePool,
    uploads_dir: &Path,
    notebook_id: i64,
    files: Vec<UploadedFile>,
) -> Result<IngestReport> {
    get_notebook(pool, notebook_id).await?;
    tokio::fs::create_dir_all(uploads_dir).await?;

    let mut report = IngestReport::default();

    for file in files {
        let original = file.file_name.unwrap_or_default();

        if !is_pdf_name(&original) {
            warn!(notebook = notebook_id, file = %original, "skipping upload: not a .pdf file");
            report.skipped.push(SkippedUpload {
                file_name: original,
                reason: "not a .pdf file".to_string(),
            });
            continue;
        }

        let stored_name = sanitize_filename(&original);
        if stored_name.is_empty() {
            warn!(notebook = notebook_id, file = %original, "skipping upload: unusable file name");
            report.skipped.push(SkippedUpload {
                file_name: original,
                reason: "unusable file name".to_string(),
            });
            continue;
        }

        let target = uploads_dir.join(&stored_name);
        if let Err(e) = tokio::fs::write(&target, &file.bytes).await {
            warn!(notebook = notebook_id, path = %target.display(), error = %e, "skipping upload: write failed");
            report.skipped.push(SkippedUpload {
                file_name: original,
                reason: format!("write failed: {}", e),
            });
            continue;
        }

        let id = sqlx::query(
            "INSERT INTO materials (notebook_id, pdf_path, file_name, uploaded_at) VALUES (?, ?, ?, datetime('now'))",
        )
        .bind(notebook_id)
        .bind(&stored_name)
        .bind(&original)
        .execute(pool)
        .await?
        .last_insert_rowid();

        info!(notebook = notebook_id, material = id, file = %stored_name, bytes = file.bytes.len(), "stored material");
        report.stored.push(get_material(pool, id).await?);
    }

    Ok(report)
}

/// Lists a notebook's materials, most recently uploaded first.
pub async fn list_materials(pool: &SqlitePool, notebook_id: i64) -> Result<Vec<Material>> {
    let rows = sqlx::query(
        "SELECT id, notebook_id, pdf_path, file_name, uploaded_at FROM materials WHERE notebook_id = ? ORDER BY uploaded_at DESC, id DESC",
    )
    .bind(notebook_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(material_from_row).collect())
}

pub async fn get_material(pool: &SqlitePool, id: i64) -> Result<Material> {
    let row = sqlx::query(
        "SELECT id, notebook_id, pdf_path, file_name, uploaded_at FROM materials WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(material_from_row(&row)),
        None => Err(NotebookError::not_found("Material not found")),
    }
}

/// Changes the display name only; the stored file keeps its name.
pub async fn rename_material(pool: &SqlitePool, id: i64, display_name: &str) -> Result<()> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(NotebookError::validation("Filename cannot be empty"));
    }

    let result = sqlx::query("UPDATE materials SET file_name = ? WHERE id = ?")
        .bind(display_name)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(NotebookError::not_found("Material not found"));
    }
    Ok(())
}

/// Deletes a material row and attempts to remove its stored file.
///
/// Returns `None` when no such material exists. File removal problems never
/// prevent the row from being deleted.
pub async fn delete_material(
    pool: &SqlitePool,
    uploads_dir: &Path,
    id: i64,
) -> Result<Option<RemovalOutcome>> {
    let stored: Option<String> = sqlx::query_scalar("SELECT pdf_path FROM materials WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(stored) = stored else {
        return Ok(None);
    };

    let outcome = remove_stored_file(uploads_dir, &stored).await;

    sqlx::query("DELETE FROM materials WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    info!(material = id, file = %stored, outcome = ?outcome, "deleted material");
    Ok(Some(outcome))
}

/// Removes a file from the uploads directory, reporting instead of failing.
pub async fn remove_stored_file(uploads_dir: &Path, stored_name: &str) -> RemovalOutcome {
    let path = uploads_dir.join(stored_name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => RemovalOutcome::Removed,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RemovalOutcome::Missing,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not remove stored file");
            RemovalOutcome::Failed(e.to_string())
        }
    }
}
