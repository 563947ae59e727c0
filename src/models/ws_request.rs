use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{Result, VantiqError};

/// Resource name the server uses for event streams.
pub const EVENTS_RESOURCE: &str = "events";

/// Resource name used to validate WebSocket credentials.
pub const CREDENTIALS_RESOURCE: &str = "system.credentials";

/// Operation carried by a client WebSocket request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsOp {
    /// Validate the access token for this socket
    Validate,
    /// Register an event subscription
    Subscribe,
    /// Acknowledge a reliable-topic delivery
    Acknowledge,
}

/// Client-to-server WebSocket request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub op: WsOp,
    pub resource_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, JsonValue>>,
}

impl WsRequest {
    /// Credential check sent right after the socket opens.
    pub fn validate(access_token: &str) -> Self {
        Self {
            access_token: None,
            op: WsOp::Validate,
            resource_name: CREDENTIALS_RESOURCE.to_string(),
            resource_id: None,
            object: Some(JsonValue::String(access_token.to_string())),
            parameters: None,
        }
    }

    /// Subscription registration for `event_path`.
    ///
    /// The event path doubles as the request id, which the server echoes in
    /// the `X-Request-Id` header of every frame for this subscription.
    pub fn subscribe(
        access_token: Option<&str>,
        event_path: &str,
        params: Option<&Map<String, JsonValue>>,
    ) -> Self {
        let mut parameters = params.cloned().unwrap_or_default();
        parameters.insert("requestId".to_string(), JsonValue::String(event_path.to_string()));
        Self {
            access_token: access_token.map(str::to_string),
            op: WsOp::Subscribe,
            resource_name: EVENTS_RESOURCE.to_string(),
            resource_id: Some(event_path.to_string()),
            object: None,
            parameters: Some(parameters),
        }
    }

    /// Acknowledgement of one reliable-topic delivery.
    ///
    /// `message_body` must carry the `sequenceId` and `partitionId` the
    /// server attached to the delivery.
    pub fn acknowledge(
        request_id: &str,
        subscription_name: &str,
        message_body: &JsonValue,
    ) -> Result<Self> {
        let field = |name: &str| {
            message_body.get(name).cloned().ok_or_else(|| {
                VantiqError::ValidationError(format!(
                    "Cannot acknowledge message without '{}' in its body",
                    name
                ))
            })
        };

        let mut parameters = Map::new();
        parameters.insert("requestId".to_string(), JsonValue::String(request_id.to_string()));
        parameters.insert(
            "subscriptionName".to_string(),
            JsonValue::String(subscription_name.to_string()),
        );
        parameters.insert("sequenceId".to_string(), field("sequenceId")?);
        parameters.insert("partitionId".to_string(), field("partitionId")?);

        Ok(Self {
            access_token: None,
            op: WsOp::Acknowledge,
            resource_name: EVENTS_RESOURCE.to_string(),
            resource_id: Some(request_id.to_string()),
            object: None,
            parameters: Some(parameters),
        })
    }
}
