//! PDF text extraction and context assembly.
//!
//! A context is the concatenated page text of a set of materials, each page
//! followed by a newline. Materials whose file is missing or unreadable are
//! skipped: the skip is logged and reported in the [`ContextBundle`], and the
//! remaining materials still contribute.

use anyhow::Result;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{debug, warn};

/// Extraction error. Never panics across this boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("could not read file: {0}")]
    Io(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extracts the text of each page of a PDF.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    // pdf-extract can panic on malformed input.
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes));
    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("extractor panicked".to_string())),
    }
}

/// Reads and extracts one stored file off the async runtime.
pub async fn extract_file_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::Io(e.to_string()))?;

    tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
        .await
        .map_err(|e| ExtractError::Pdf(e.to_string()))?
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SkippedMaterial {
    pub material_id: i64,
    pub reason: String,
}

/// Grounding text plus a record of what went into it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub text: String,
    pub included: Vec<i64>,
    pub skipped: Vec<SkippedMaterial>,
}

/// Builds the grounding context for a question.
///
/// An empty `selected` means every material of the notebook. Selected ids
/// that belong to another notebook are ignored.
pub async fn build_context(
    pool: &SqlitePool,
    uploads_dir: &Path,
    notebook_id: i64,
    selected: &[i64],
) -> Result<ContextBundle> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, pdf_path FROM materials WHERE notebook_id = ");
    query.push_bind(notebook_id);
    if !selected.is_empty() {
        query.push(" AND id IN (");
        let mut ids = query.separated(", ");
        for id in selected {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    query.push(" ORDER BY id");

    let rows = query.build().fetch_all(pool).await?;

    let mut bundle = ContextBundle::default();
    for row in rows {
        let id: i64 = row.get("id");
        let stored: String = row.get("pdf_path");
        let path = uploads_dir.join(&stored);

        match extract_file_pages(&path).await {
            Ok(pages) => {
                debug!(material = id, pages = pages.len(), "extracted material");
                for page in pages {
                    bundle.text.push_str(&page);
                    bundle.text.push('\n');
                }
                bundle.included.push(id);
            }
            Err(e) => {
                warn!(material = id, path = %path.display(), error = %e, "skipping material in context");
                bundle.skipped.push(SkippedMaterial {
                    material_id: id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(bundle)
}
