//! Decoders for the loosely specified parts of Aras responses.
//!
//! Each decoder tries an explicit, ordered list of shapes and reports
//! `ApiError::ResponseShapeUnrecognized` when none matches.

use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;

const ID_KEYS: [&str; 3] = ["id", "ID", "Id"];

fn non_empty_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_field(object: &Value) -> Option<String> {
    ID_KEYS.iter().find_map(|key| object.get(*key).and_then(non_empty_id))
}

/// Item id of a creation response.
///
/// Accepted shapes, in order:
/// 1. `{"id": ..}` (also `ID`, `Id`)
/// 2. `{"value": [{"id": ..}, ..]}`
pub fn created_id(response: &Value) -> Result<String, ApiError> {
    if let Some(id) = id_field(response) {
        return Ok(id);
    }
    let first = response
        .get("value")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first());
    if let Some(id) = first.and_then(id_field) {
        return Ok(id);
    }
    Err(ApiError::shape("created item id", response))
}

/// Related item id of a single relationship row.
///
/// Accepted shapes, in order:
/// 1. `{"related_id": "<id>"}`
/// 2. `{"related_id": {"id": "<id>", ..}}` (expanded)
/// 3. `{"related_id@aras.id": "<id>"}`
/// 4. `{"related_id_id": "<id>"}`
pub fn related_id(row: &Value) -> Result<String, ApiError> {
    if let Some(related) = row.get("related_id") {
        if let Some(id) = non_empty_id(related) {
            return Ok(id);
        }
        if let Some(id) = related.get("id").and_then(non_empty_id) {
            return Ok(id);
        }
    }
    for key in ["related_id@aras.id", "related_id_id"] {
        if let Some(id) = row.get(key).and_then(non_empty_id) {
            return Ok(id);
        }
    }
    Err(ApiError::shape("related_id", row))
}

/// Related ids of a relationship query response (`{"value": [rows]}`), in
/// row order. Rows without a recognizable related id are skipped.
pub fn related_ids(response: &Value) -> Result<Vec<String>, ApiError> {
    let rows = response
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::shape("object with a value array", response))?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        match related_id(row) {
            Ok(id) => ids.push(id),
            Err(e) => warn!(error = %e, "skipping relationship row"),
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_id_prefers_top_level_keys_in_order() {
        assert_eq!(created_id(&json!({"id": "A", "ID": "B"})).unwrap(), "A");
        assert_eq!(created_id(&json!({"id": "", "Id": "C"})).unwrap(), "C");
    }

    #[test]
    fn created_id_falls_back_to_first_value_row() {
        let response = json!({"value": [{"ID": "V1"}, {"id": "V2"}]});
        assert_eq!(created_id(&response).unwrap(), "V1");
    }

    #[test]
    fn created_id_unrecognized() {
        let err = created_id(&json!({"value": []})).unwrap_err();
        assert!(matches!(
            err,
            ApiError::ResponseShapeUnrecognized { expected: "created item id", .. }
        ));
        assert!(created_id(&json!("ID")).is_err());
    }

    #[test]
    fn related_id_shapes() {
        assert_eq!(related_id(&json!({"related_id": "R1"})).unwrap(), "R1");
        let nested = json!({"related_id": {"id": "R2", "keyed_name": "x"}});
        assert_eq!(related_id(&nested).unwrap(), "R2");
        assert_eq!(related_id(&json!({"related_id@aras.id": "R3"})).unwrap(), "R3");
        assert_eq!(related_id(&json!({"related_id": null, "related_id_id": "R4"})).unwrap(), "R4");
        assert!(related_id(&json!({"source_id": "D"})).is_err());
    }

    #[test]
    fn related_ids_skips_unrecognized_rows() {
        let response = json!({"value": [
            {"related_id": "A"},
            {"other": 1},
            {"related_id": {"id": "B"}},
        ]});
        assert_eq!(related_ids(&response).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn related_ids_requires_value_array() {
        assert!(matches!(
            related_ids(&json!({"error": "x"})),
            Err(ApiError::ResponseShapeUnrecognized { .. })
        ));
    }
}
