//! Domain errors that callers are expected to react to.
//!
//! These travel inside `anyhow::Error`; the HTTP layer recovers them with
//! `downcast_ref` to pick a status code. Anything else is an internal error.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotebookError {
    /// Input rejected before any write happened.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// A write collided with an existing row.
    #[error("{0}")]
    Conflict(String),
    /// A selected-source token that is not a material id.
    #[error("invalid selected source id: '{0}'")]
    InvalidSelection(String),
}

impl NotebookError {
    pub fn validation(message: impl Into<String>) -> anyhow::Error {
        NotebookError::Validation(message.into()).into()
    }

    pub fn not_found(message: impl Into<String>) -> anyhow::Error {
        NotebookError::NotFound(message.into()).into()
    }
}
