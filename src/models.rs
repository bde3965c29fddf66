//! Core data models.
//!
//! Rows read back from SQLite. Timestamps stay in SQLite's
//! `YYYY-MM-DD HH:MM:SS` text form, as written by `datetime('now')`.

use serde::Serialize;

/// A collection of materials, chat sessions and notes on one subject.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notebook {
    pub id: i64,
    pub subject: String,
    pub created_at: String,
}

/// Notebook listing entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotebookSummary {
    pub id: i64,
    pub subject: String,
    pub created_at: String,
    pub material_count: i64,
}

/// An uploaded PDF.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Material {
    pub id: i64,
    pub notebook_id: i64,
    /// Sanitized file name inside the uploads directory.
    pub pdf_path: String,
    /// Name shown to the user; starts as the original upload name.
    pub file_name: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatSession {
    pub id: String,
    pub notebook_id: i64,
    pub title: String,
    pub created_at: String,
    pub last_activity: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub notebook_id: i64,
    pub session_id: Option<String>,
    pub message: String,
    pub is_user: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Note {
    pub id: i64,
    pub notebook_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

/// Note listing entry (content omitted).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoteSummary {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}
