//! Parsing of the "selected sources" request parameter.
//!
//! The parameter arrives absent, as one id, as a comma-separated string, or
//! as a JSON list. An empty result means "use every material of the
//! notebook". A token that is not an integer is an error, never dropped.

use serde::Deserialize;

use crate::error::NotebookError;

/// Raw selected-sources value as sent by a client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourceSelection {
    List(Vec<SelectionItem>),
    Id(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SelectionItem {
    Id(i64),
    Text(String),
}

/// Normalizes a selection into material ids, preserving order.
pub fn parse_selected_sources(
    selection: Option<&SourceSelection>,
) -> Result<Vec<i64>, NotebookError> {
    match selection {
        None => Ok(Vec::new()),
        Some(SourceSelection::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                SelectionItem::Id(id) => Some(Ok(*id)),
                SelectionItem::Text(s) if s.is_empty() => None,
                SelectionItem::Text(s) => Some(parse_id(s)),
            })
            .collect(),
        Some(SourceSelection::Id(id)) => Ok(vec![*id]),
        Some(SourceSelection::Text(s)) => parse_selection_str(s),
    }
}

/// String form: `""` → none, `"5"` → one id, `"1, 2,,3"` → several.
pub fn parse_selection_str(s: &str) -> Result<Vec<i64>, NotebookError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }

    if s.contains(',') {
        s.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(parse_id)
            .collect()
    } else {
        Ok(vec![parse_id(s)?])
    }
}

/// Comma-joined form used to echo the active selection back to clients.
pub fn format_selected_sources(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_id(token: &str) -> Result<i64, NotebookError> {
    token
        .trim()
        .parse::<i64>()
        .map_err(|_| NotebookError::InvalidSelection(token.to_string()))
}
