//! # vantiq-link
//!
//! Async client for the Vantiq platform.
//!
//! - **Authentication**: credential exchange, token refresh, or a
//!   pre-issued access token ([`TokenStore`]).
//! - **Resources**: select / insert / update / upsert / delete / count,
//!   procedure execution and publishing over REST, each returning a
//!   uniform [`VantiqResponse`].
//! - **Documents**: multipart upload and streamed download.
//! - **Subscriptions**: one WebSocket per session multiplexing every topic,
//!   type, service-event and source subscription, with per-subscription
//!   ordered callbacks and reliable-topic acknowledgements.
//!
//! ```rust,no_run
//! use vantiq_link::{resources, SubscriptionEvent, VantiqClient};
//!
//! # async fn example() -> vantiq_link::Result<()> {
//! let client = VantiqClient::builder()
//!     .server_url("https://dev.vantiq.com")
//!     .build()?;
//! client.authenticate("alice", "secret").await?;
//!
//! client
//!     .subscribe(resources::TOPICS, "/orders", None, |event: SubscriptionEvent| async move {
//!         log::info!("{}: {}", event.kind(), event.message().body);
//!     }, None)
//!     .await?
//!     .error_for_status()?;
//!
//! client
//!     .publish(resources::TOPICS, "/orders", &serde_json::json!({ "id": 1 }))
//!     .await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! The library logs through the [`log`] facade and never installs a logger.

pub mod auth;
pub mod client;
pub mod connection;
pub mod documents;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod query;
pub mod resources;
pub mod rest;
pub mod subscription;
pub mod timeouts;
pub mod tls;

pub use auth::TokenStore;
pub use client::{VantiqClient, VantiqClientBuilder, DEFAULT_API_VERSION};
pub use connection::TransportState;
pub use documents::{DocumentStream, DocumentTransfer};
pub use error::{Result, VantiqError};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    AuthTokens, ConnectionOptions, DocumentMetadata, ErrorDetail, ResponseBody, SubscriptionEvent,
    SubscriptionInfo, SubscriptionMessage, VantiqResponse,
};
pub use query::QueryParams;
pub use rest::RestExecutor;
pub use subscription::{HandlerFuture, SubscriptionHandler};
pub use timeouts::{VantiqTimeouts, VantiqTimeoutsBuilder};
pub use tls::TlsMode;
