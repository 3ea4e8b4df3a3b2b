//! Domain DTOs for the import and refresh commands.
//!
//! Input entries come from an upstream extraction step, so every field is
//! optional and absent strings are read as empty. Numbers and booleans in
//! those fields are taken as their text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Maximum length Aras accepts for `req_title`.
pub const TITLE_MAX_CHARS: usize = 255;

/// One entry of `import_sequence.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    #[serde(default, deserialize_with = "lenient_text")]
    pub req_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub chapter: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub section: Option<String>,
}

/// `null` is `None`; any other value becomes its text (`3` -> `"3"`).
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl ImportEntry {
    /// Label used in progress output; falls back to the entry's index.
    pub fn label(&self, index: usize) -> String {
        self.req_number
            .clone()
            .unwrap_or_else(|| format!("IDX-{index}"))
    }

    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

/// Body of the requirement creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRequirement {
    pub req_title: String,
    pub req_category: Option<String>,
    pub managed_by_id: String,
    pub classification: String,
    pub req_document_type: String,
}

/// Body of the document-to-requirement relationship creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLink {
    pub source_id: String,
    pub related_id: String,
    pub reference_id: String,
    pub behavior: String,
}

impl NewLink {
    pub fn hard_fixed(document_id: &str, requirement_id: &str) -> Self {
        Self {
            source_id: document_id.to_string(),
            related_id: requirement_id.to_string(),
            reference_id: requirement_id.to_string(),
            behavior: "hard_fixed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub req_number: Option<String>,
    pub req_id: String,
    pub title: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub req_number: Option<String>,
    pub error: String,
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub time_seconds: f64,
}

/// Content of `import_results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResults {
    pub summary: ImportSummary,
    pub created: Vec<CreatedRecord>,
    pub failed: Vec<FailedRecord>,
}
