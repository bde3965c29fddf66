//! # Notebook LM
//!
//! Organize PDFs into notebooks and ask questions answered by a generative
//! model, grounded in the text extracted from those PDFs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │  Upload  │──▶│ Materials │──▶│  SQLite   │
//! │  (PDF)   │   │ + uploads │   │ notebooks │
//! └──────────┘   └───────────┘   └─────┬─────┘
//!                                      │
//!          ┌──────────┐   ┌─────────┐  │
//!          │ Generator│◀──│  Chat   │◀─┤
//!          │ (Gemini) │   │ + render│  │
//!          └──────────┘   └─────────┘  ▼
//!                                ┌──────────┐
//!                                │   HTTP   │
//!                                │  (axum)  │
//!                                └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nlm init          # create database and uploads directory
//! nlm serve         # start the HTTP API
//! nlm notebooks     # list notebooks
//! nlm reset         # wipe database and uploads
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Shared pool, config and generator; database connection |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Core data types |
//! | [`error`] | Domain error kinds |
//! | [`notebooks`] | Notebook management |
//! | [`materials`] | PDF ingestion and management |
//! | [`selection`] | Selected-source parsing |
//! | [`extract`] | PDF text extraction and context assembly |
//! | [`generate`] | Answer generator abstraction |
//! | [`render`] | Markdown to HTML for replies |
//! | [`sessions`] | Chat session lifecycle |
//! | [`chat`] | Asking questions, chat history |
//! | [`notes`] | Notes |
//! | [`reset`] | Database and uploads wipe |
//! | [`server`] | HTTP API |

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod materials;
pub mod migrate;
pub mod models;
pub mod notebooks;
pub mod notes;
pub mod render;
pub mod reset;
pub mod selection;
pub mod server;
pub mod sessions;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod fixtures;
