//! Data models for the vantiq-link client library.
//!
//! Defines the response envelope, error records, authentication payloads and
//! the WebSocket subscription messages.

pub mod auth_tokens;
pub mod connection_options;
pub mod document;
pub mod error_detail;
pub mod response;
pub mod subscription_event;
pub mod subscription_info;
pub mod subscription_message;
pub mod ws_request;

#[cfg(test)]
mod tests;

pub use auth_tokens::AuthTokens;
pub use connection_options::ConnectionOptions;
pub use document::DocumentMetadata;
pub use error_detail::{ErrorDetail, GENERIC_ERROR_CODE, NOT_FOUND_CODE, UNKNOWN_RESOURCE_CODE};
pub use response::{ResponseBody, VantiqResponse};
pub use subscription_event::SubscriptionEvent;
pub use subscription_info::SubscriptionInfo;
pub use subscription_message::{SubscriptionMessage, REQUEST_ID_HEADER};
pub use ws_request::{WsOp, WsRequest};
