use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Metadata the server keeps for a stored document.
///
/// `content` is a server-relative path (e.g. `/docs/report.txt`), never
/// the document bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_size: Option<u64>,
}

impl DocumentMetadata {
    /// Read document metadata out of a JSON response body.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
