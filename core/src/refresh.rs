//! Helpers for rebuilding a requirement document from its links.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::client::ItemQuery;
use crate::decode::related_ids;
use crate::error::ApiError;
use crate::http::Transport;
use crate::session::Session;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdListError {
    #[error("ids file is not valid JSON: {0}")]
    Json(String),
    #[error("ids file must be a JSON array of strings, e.g. [\"ID1\",\"ID2\"]")]
    NotStringArray,
}

/// Parse an override file: a JSON array whose elements are all strings.
pub fn parse_id_list(raw: &str) -> Result<Vec<String>, IdListError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| IdListError::Json(e.to_string()))?;
    let items = value.as_array().ok_or(IdListError::NotStringArray)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or(IdListError::NotStringArray))
        .collect()
}

/// Drop repeated ids, keeping each at its first position.
pub fn dedupe_preserving_order<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Trim every id, drop blank ones, then de-duplicate in order.
pub fn unique_ids<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    dedupe_preserving_order(
        ids.into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
    )
}

/// `$filter` selecting the links whose source is `document_id`.
pub fn links_filter(document_id: &str) -> String {
    format!("source_id eq '{document_id}'")
}

/// Related ids of every link from `document_id`, in server order.
pub fn fetch_linked_ids<T: Transport>(
    session: &mut Session<T>,
    relationship_item_type: &str,
    document_id: &str,
) -> Result<Vec<String>, ApiError> {
    let query = ItemQuery::filter(links_filter(document_id)).with_select("related_id");
    let response = session.get_items(relationship_item_type, &query)?;
    related_ids(&response)
}
