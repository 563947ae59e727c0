use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Header carrying the correlation key of a subscription frame.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// One inbound WebSocket frame: `{status, headers, body}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub status: u16,
    #[serde(default, deserialize_with = "headers_as_strings")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: JsonValue,
}

impl SubscriptionMessage {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `X-Request-Id` header: the event path this frame belongs to.
    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    /// The subscription name (`body.name`) carried by a registration
    /// confirmation.
    pub fn subscription_name(&self) -> Option<&str> {
        self.body.get("name").and_then(JsonValue::as_str)
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

fn headers_as_strings<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, JsonValue>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(s) => s,
                JsonValue::Array(mut items) if items.len() == 1 => match items.remove(0) {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                },
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
