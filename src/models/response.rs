//! The uniform result envelope returned by every REST, document and
//! subscription operation.

use bytes::Bytes;
use serde_json::{Map, Value as JsonValue};

use crate::documents::DocumentStream;
use crate::error::{Result, VantiqError};

use super::error_detail::{ErrorDetail, UNKNOWN_RESOURCE_CODE};

/// Body of a [`VantiqResponse`].
///
/// JSON bodies are split by shape so callers can match on objects and
/// arrays directly. Downloads carry a single-pass [`DocumentStream`].
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// No body (or a JSON `null`).
    #[default]
    Empty,
    /// A JSON object.
    Object(Map<String, JsonValue>),
    /// A JSON array.
    Array(Vec<JsonValue>),
    /// A JSON scalar (string, number, boolean).
    Scalar(JsonValue),
    /// A non-JSON body, passed through untouched.
    Bytes(Bytes),
    /// A lazily read download body.
    Stream(DocumentStream),
}

impl ResponseBody {
    /// Classify a decoded JSON value.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Empty,
            JsonValue::Object(map) => Self::Object(map),
            JsonValue::Array(items) => Self::Array(items),
            scalar => Self::Scalar(scalar),
        }
    }

    /// `true` for [`ResponseBody::Empty`], an empty object or an empty array.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Object(map) => map.is_empty(),
            Self::Array(items) => items.is_empty(),
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Scalar(_) | Self::Stream(_) => false,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, JsonValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a JSON-shaped body back into a [`serde_json::Value`].
    ///
    /// Returns `None` for byte and stream bodies.
    pub fn to_json(&self) -> Option<JsonValue> {
        match self {
            Self::Empty => Some(JsonValue::Null),
            Self::Object(map) => Some(JsonValue::Object(map.clone())),
            Self::Array(items) => Some(JsonValue::Array(items.clone())),
            Self::Scalar(value) => Some(value.clone()),
            Self::Bytes(_) | Self::Stream(_) => None,
        }
    }

    /// Take the download stream out of the body, if this is one.
    pub fn into_stream(self) -> Option<DocumentStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

/// Result of one operation against the server.
///
/// Success is derived, never stored: [`is_success`](Self::is_success) is
/// exactly "no errors and status below 400".
#[derive(Debug, Default)]
pub struct VantiqResponse {
    /// HTTP status (or WebSocket frame status for subscription results).
    pub status_code: u16,
    /// Response content type, when the server sent one.
    pub content_type: Option<String>,
    pub body: ResponseBody,
    /// Total count, present only when the caller asked for one.
    pub count: Option<u64>,
    /// Error records, in the order the server reported them.
    pub errors: Vec<ErrorDetail>,
}

impl VantiqResponse {
    pub(crate) fn success(status_code: u16, content_type: Option<String>, body: ResponseBody) -> Self {
        Self {
            status_code,
            content_type,
            body,
            count: None,
            errors: Vec::new(),
        }
    }

    /// Build a failed response. An empty `errors` list is replaced with a
    /// generic record so a failure is never silent.
    pub(crate) fn failure(
        status_code: u16,
        content_type: Option<String>,
        mut errors: Vec<ErrorDetail>,
    ) -> Self {
        if errors.is_empty() {
            errors.push(ErrorDetail::generic(status_code, ""));
        }
        Self {
            status_code,
            content_type,
            body: ResponseBody::Empty,
            count: None,
            errors,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.status_code < 400
    }

    /// The first error record, if any.
    pub fn first_error(&self) -> Option<&ErrorDetail> {
        self.errors.first()
    }

    /// Turn a failed response into a typed [`VantiqError`].
    ///
    /// Successful responses are returned unchanged.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Classify this response's status and error records as a
    /// [`VantiqError`], regardless of success.
    pub(crate) fn into_error(self) -> VantiqError {
        let summary = self
            .errors
            .iter()
            .map(ErrorDetail::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let unknown_resource = self.errors.iter().any(|e| e.code == UNKNOWN_RESOURCE_CODE);

        match self.status_code {
            401 | 403 => VantiqError::AuthenticationError(summary),
            404 if unknown_resource => VantiqError::UnknownResource(summary),
            404 => VantiqError::NotFound(summary),
            400 | 409 | 422 => VantiqError::ValidationError(summary),
            status_code => VantiqError::ServerError {
                status_code,
                message: summary,
            },
        }
    }
}

impl std::fmt::Display for VantiqResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VantiqResponse(status={}, success={}", self.status_code, self.is_success())?;
        if let Some(count) = self.count {
            write!(f, ", count={}", count)?;
        }
        for err in &self.errors {
            write!(f, ", error=[{}]", err)?;
        }
        write!(f, ")")
    }
}
