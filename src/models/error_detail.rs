use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Error code used when a failed response carries no recognizable error body.
pub const GENERIC_ERROR_CODE: &str = "io.vantiq.client.http.error";

/// Error code the server reports for an unrecognized resource kind.
pub const UNKNOWN_RESOURCE_CODE: &str = "io.vantiq.type.system.resource.unknown";

/// Error code the server reports for a missing resource instance.
pub const NOT_FOUND_CODE: &str = "io.vantiq.resource.not.found";

/// One error record from a failed server response.
///
/// `code`, `message` and `params` are kept exactly as the server sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code, e.g. `io.vantiq.resource.not.found`
    pub code: String,

    /// Human-readable error message
    #[serde(default)]
    pub message: String,

    /// Positional parameters used to build `message`
    #[serde(default, deserialize_with = "params_as_strings")]
    pub params: Vec<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            params,
        }
    }

    /// Build the fallback record for an error body that could not be parsed.
    pub fn generic(status_code: u16, body_text: &str) -> Self {
        let message = if body_text.trim().is_empty() {
            format!("Request failed with HTTP status {}", status_code)
        } else {
            body_text.trim().to_string()
        };
        Self::new(GENERIC_ERROR_CODE, message, vec![status_code.to_string()])
    }

    /// Parse the platform's error schema: a single `{code, message, params}`
    /// object or an array of them.
    ///
    /// Always yields at least one record; anything unrecognizable becomes a
    /// [`GENERIC_ERROR_CODE`] record carrying the raw text.
    pub fn parse_body(status_code: u16, body: &[u8]) -> Vec<ErrorDetail> {
        let text = String::from_utf8_lossy(body);
        let parsed = match serde_json::from_slice::<JsonValue>(body) {
            Ok(JsonValue::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<ErrorDetail>(item).ok())
                .collect(),
            Ok(value @ JsonValue::Object(_)) => serde_json::from_value::<ErrorDetail>(value)
                .map(|detail| vec![detail])
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        if parsed.is_empty() {
            vec![Self::generic(status_code, &text)]
        } else {
            parsed
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if !self.params.is_empty() {
            write!(f, " {:?}", self.params)?;
        }
        Ok(())
    }
}

fn params_as_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<JsonValue>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            JsonValue::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}
