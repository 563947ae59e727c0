//! Session facade for the Vantiq platform.
//!
//! A [`VantiqClient`] owns one session: its tokens, a lazily built HTTP
//! connection pool, and at most one subscriber transport multiplexing every
//! event subscription. Clones share the session.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{mpsc, watch, Mutex};

use crate::auth::{self, TokenStore};
use crate::connection::{
    ws, Registration, SubscriberTransport, TransportConfig, TransportHandle, TransportState,
};
use crate::documents::DocumentTransfer;
use crate::error::{Result, VantiqError};
use crate::event_handlers::EventHandlers;
use crate::models::{
    ConnectionOptions, ErrorDetail, ResponseBody, SubscriptionInfo, VantiqResponse, WsRequest,
    UNKNOWN_RESOURCE_CODE,
};
use crate::query::QueryParams;
use crate::resources;
use crate::rest::RestExecutor;
use crate::subscription::{spawn_dispatcher, SubscriptionHandler};
use crate::timeouts::VantiqTimeouts;
use crate::tls::TlsMode;

/// API version used when the builder is not given one.
pub const DEFAULT_API_VERSION: &str = "1";

/// Async client for one Vantiq session.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use vantiq_link::{resources, QueryParams, VantiqClient};
///
/// # async fn example() -> vantiq_link::Result<()> {
/// let client = VantiqClient::builder()
///     .server_url("https://dev.vantiq.com")
///     .build()?;
/// client.authenticate("alice", "secret").await?;
///
/// let rows = client
///     .select(resources::TYPES, &QueryParams::new().props(["name"]).limit(10))
///     .await?;
/// println!("{} of {:?} types", rows.body.as_array().map_or(0, |r| r.len()), rows.count);
///
/// client.insert("Order", &json!({ "id": 7, "total": 12.5 })).await?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VantiqClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    server_url: String,
    api_version: String,
    ws_url: String,
    tokens: Arc<TokenStore>,
    tls: TlsMode,
    request_timeout: Option<Duration>,
    timeouts: VantiqTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    /// Built on first use, dropped by `close`.
    http_client: RwLock<Option<reqwest::Client>>,
    /// Serializes transport start and shutdown.
    transport: Mutex<Option<SubscriberTransport>>,
    /// Bumped by `close`; aborts a transport start in progress.
    close_signal: watch::Sender<u64>,
    /// Lock-free view of the transport for state queries.
    transport_view: RwLock<TransportView>,
}

#[derive(Clone)]
enum TransportView {
    Unstarted,
    Starting,
    Running(TransportHandle),
    Closed,
}

impl ClientInner {
    fn view(&self) -> RwLockReadGuard<'_, TransportView> {
        self.transport_view.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_view(&self, view: TransportView) {
        let mut guard: RwLockWriteGuard<'_, TransportView> =
            self.transport_view.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = view;
    }
}

impl VantiqClient {
    /// Create a new builder.
    pub fn builder() -> VantiqClientBuilder {
        VantiqClientBuilder::new()
    }

    /// Server root URL, without a trailing `/`.
    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    pub fn api_version(&self) -> &str {
        &self.inner.api_version
    }

    fn api_base(&self) -> String {
        format!("{}/api/v{}", self.inner.server_url, self.inner.api_version)
    }

    // ── HTTP pool ───────────────────────────────────────────────────────────

    /// Build the HTTP connection pool now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        self.http_client().map(|_| ())
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        {
            let guard = self
                .inner
                .http_client
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(client) = guard.as_ref() {
                return Ok(client.clone());
            }
        }

        let mut guard = self
            .inner
            .http_client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        // No client-wide timeout: downloads stream past it. Per-request
        // timeouts are applied by the REST executor.
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));
        if !VantiqTimeouts::is_no_timeout(self.inner.timeouts.connection_timeout) {
            builder = builder.connect_timeout(self.inner.timeouts.connection_timeout);
        }
        builder = self.inner.tls.apply_to_http(builder)?;

        let client = builder
            .build()
            .map_err(|e| VantiqError::ConfigurationError(e.to_string()))?;
        log::debug!("[REST] HTTP pool ready for {} (tls={:?})", self.inner.server_url, self.inner.tls);
        *guard = Some(client.clone());
        Ok(client)
    }

    /// The REST layer bound to this session.
    pub fn rest(&self) -> Result<RestExecutor> {
        Ok(RestExecutor::new(
            self.api_base(),
            self.http_client()?,
            self.inner.tokens.clone(),
            self.inner.request_timeout,
        ))
    }

    /// The document layer bound to this session.
    pub fn documents(&self) -> Result<DocumentTransfer> {
        Ok(DocumentTransfer::new(self.inner.server_url.clone(), self.rest()?))
    }

    // ── Authentication ──────────────────────────────────────────────────────

    /// Exchange a username and password for a session token pair.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let http = self.http_client()?;
        let tokens = auth::exchange_credentials(
            &http,
            &self.inner.server_url,
            username,
            password,
            self.inner.request_timeout,
        )
        .await?;
        self.inner.tokens.store(tokens, Some(username));
        log::info!("[AUTH] Authenticated '{}'", username);
        Ok(())
    }

    /// Trade the current access token for a fresh token pair.
    pub async fn refresh(&self) -> Result<()> {
        let access_token = self.inner.tokens.access_token().ok_or_else(|| {
            VantiqError::AuthenticationError("No access token to refresh".to_string())
        })?;
        let http = self.http_client()?;
        let tokens = auth::exchange_refresh(
            &http,
            &self.inner.server_url,
            &access_token,
            self.inner.request_timeout,
        )
        .await?;
        self.inner.tokens.store(tokens, None);
        log::debug!("[AUTH] Access token refreshed");
        Ok(())
    }

    /// Use an access token obtained elsewhere. No request is made.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.inner.tokens.set_access_token(token);
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    pub fn get_access_token(&self) -> Option<String> {
        self.inner.tokens.access_token()
    }

    pub fn get_id_token(&self) -> Option<String> {
        self.inner.tokens.id_token()
    }

    pub fn get_username(&self) -> Option<String> {
        self.inner.tokens.username()
    }

    pub fn set_username(&self, username: Option<String>) {
        self.inner.tokens.set_username(username);
    }

    // ── Resources ───────────────────────────────────────────────────────────

    pub async fn select(&self, kind: &str, query: &QueryParams) -> Result<VantiqResponse> {
        self.rest()?.select(kind, query).await
    }

    pub async fn select_one(&self, kind: &str, id: &str) -> Result<VantiqResponse> {
        self.rest()?.select_one(kind, id).await
    }

    pub async fn insert(&self, kind: &str, instance: &JsonValue) -> Result<VantiqResponse> {
        self.rest()?.insert(kind, instance).await
    }

    pub async fn update(&self, kind: &str, id: &str, changes: &JsonValue) -> Result<VantiqResponse> {
        self.rest()?.update(kind, id, changes).await
    }

    pub async fn upsert(&self, kind: &str, instance: &JsonValue) -> Result<VantiqResponse> {
        self.rest()?.upsert(kind, instance).await
    }

    pub async fn delete(&self, kind: &str, filter: Option<&JsonValue>) -> Result<VantiqResponse> {
        self.rest()?.delete(kind, filter).await
    }

    pub async fn delete_one(&self, kind: &str, id: &str) -> Result<VantiqResponse> {
        self.rest()?.delete_one(kind, id).await
    }

    pub async fn count(&self, kind: &str, filter: Option<&JsonValue>) -> Result<VantiqResponse> {
        self.rest()?.count(kind, filter).await
    }

    pub async fn execute(&self, procedure: &str, params: Option<&JsonValue>) -> Result<VantiqResponse> {
        self.rest()?.execute(procedure, params).await
    }

    pub async fn publish(&self, kind: &str, id: &str, message: &JsonValue) -> Result<VantiqResponse> {
        self.rest()?.publish(kind, id, message).await
    }

    pub async fn get_namespace_users(&self, namespace: &str) -> Result<VantiqResponse> {
        self.rest()?.get_namespace_users(namespace).await
    }

    // ── Documents ───────────────────────────────────────────────────────────

    /// See [`DocumentTransfer::upload`].
    pub async fn upload(
        &self,
        kind: &str,
        content_type: &str,
        filename: Option<&Path>,
        inmem: Option<Bytes>,
        doc_name: Option<&str>,
    ) -> Result<VantiqResponse> {
        self.documents()?
            .upload(kind, content_type, filename, inmem, doc_name)
            .await
    }

    /// See [`DocumentTransfer::download`].
    pub async fn download(&self, content_url: &str) -> Result<VantiqResponse> {
        self.documents()?.download(content_url).await
    }

    /// See [`DocumentTransfer::download_to`].
    pub async fn download_to<F>(&self, content_url: &str, handler: F) -> Result<VantiqResponse>
    where
        F: FnMut(&str, usize, &[u8]),
    {
        self.documents()?.download_to(content_url, handler).await
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            ws_url: self.inner.ws_url.clone(),
            tokens: self.inner.tokens.clone(),
            tls: self.inner.tls.clone(),
            timeouts: self.inner.timeouts.clone(),
            connection_options: self.inner.connection_options.clone(),
            event_handlers: self.inner.event_handlers.clone(),
        }
    }

    /// Open the subscriber transport if it is not already running.
    ///
    /// Returns once the socket is open and the session's credentials are
    /// accepted. Calls made while a start is in progress wait for it. A
    /// transport that has disconnected is replaced by a fresh one.
    pub async fn start_subscriber_transport(&self) -> Result<()> {
        self.ensure_transport().await.map(|_| ())
    }

    async fn ensure_transport(&self) -> Result<TransportHandle> {
        let mut guard = self.inner.transport.lock().await;
        if let Some(transport) = guard.as_ref() {
            if transport.state() != TransportState::Disconnected {
                return Ok(transport.handle());
            }
        }
        if let Some(stale) = guard.take() {
            log::debug!("[WS] Replacing disconnected subscriber transport");
            stale.shutdown().await;
        }

        self.inner.set_view(TransportView::Starting);
        let closed = self.inner.close_signal.subscribe();
        match SubscriberTransport::start(self.transport_config(), closed).await {
            Ok(transport) => {
                let handle = transport.handle();
                self.inner.set_view(TransportView::Running(handle.clone()));
                *guard = Some(transport);
                Ok(handle)
            },
            Err(e) => {
                self.inner.set_view(TransportView::Closed);
                Err(e)
            },
        }
    }

    /// Handle of a transport that is currently running; never starts one.
    fn running_handle(&self) -> Option<TransportHandle> {
        match &*self.inner.view() {
            TransportView::Running(handle) if handle.state() != TransportState::Disconnected => {
                Some(handle.clone())
            },
            _ => None,
        }
    }

    pub fn transport_state(&self) -> TransportState {
        match &*self.inner.view() {
            TransportView::Unstarted => TransportState::Unstarted,
            TransportView::Starting => TransportState::Connecting,
            TransportView::Running(handle) => handle.state(),
            TransportView::Closed => TransportState::Disconnected,
        }
    }

    /// Subscribe to an event stream, starting the transport if needed.
    ///
    /// `kind` is one of [`resources::TOPICS`], [`resources::TYPES`],
    /// [`resources::SERVICES`] or [`resources::SOURCES`]. For types,
    /// `operation` selects `insert`, `update` or `delete` (all events when
    /// `None`); for services `id` is `<service>/<event>`. Pass
    /// `{"persistent": true}` in `params` for a reliable topic.
    ///
    /// On success the handler's first event is `"connect"`, carrying the
    /// registration confirmation, and the returned response's body is that
    /// confirmation. If the kind has no event stream, or the server rejects
    /// the registration, the response is a failure and the handler is never
    /// called. A missing id is an `Err`.
    pub async fn subscribe<H>(
        &self,
        kind: &str,
        id: &str,
        operation: Option<&str>,
        handler: H,
        params: Option<Map<String, JsonValue>>,
    ) -> Result<VantiqResponse>
    where
        H: SubscriptionHandler,
    {
        if !resources::is_subscribable(kind) {
            log::warn!("[SUB] '{}' has no event stream to subscribe to", kind);
            return Ok(VantiqResponse::failure(
                404,
                None,
                vec![ErrorDetail::new(
                    UNKNOWN_RESOURCE_CODE,
                    format!(
                        "The resource {} does not support subscriptions; use topics, types, services or sources.",
                        kind
                    ),
                    vec![kind.to_string()],
                )],
            ));
        }
        let request_id = resources::event_path(kind, id, operation)?;
        let handle = self.ensure_transport().await?;

        let registration = Registration {
            request_id: request_id.clone(),
            resource_kind: kind.to_string(),
            resource_id: id.to_string(),
            params,
        };
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let confirmation = handle.subscribe(registration, event_tx).await?;

        if !confirmation.is_success() {
            log::warn!(
                "[SUB] Registration of '{}' rejected with status {}",
                request_id,
                confirmation.status
            );
            let raw = serde_json::to_vec(&confirmation.body)?;
            let errors = ErrorDetail::parse_body(confirmation.status, &raw);
            return Ok(VantiqResponse::failure(
                confirmation.status,
                Some("application/json".to_string()),
                errors,
            ));
        }

        log::debug!(
            "[SUB] Subscribed to '{}' as {:?}",
            request_id,
            confirmation.subscription_name()
        );
        spawn_dispatcher(request_id, Arc::new(handler), event_rx);

        Ok(VantiqResponse::success(
            confirmation.status,
            Some("application/json".to_string()),
            ResponseBody::from_json(confirmation.body),
        ))
    }

    /// Acknowledge a reliable-topic delivery.
    ///
    /// `request_id` is the message's `X-Request-Id` header,
    /// `subscription_id` the `body.name` of the subscription's connect
    /// event, and `message_body` the delivered body (it carries the
    /// partition and sequence ids). No reply is awaited.
    pub async fn ack(&self, request_id: &str, subscription_id: &str, message_body: &JsonValue) -> Result<()> {
        let request = WsRequest::acknowledge(request_id, subscription_id, message_body)?;
        let handle = self.running_handle().ok_or_else(|| {
            VantiqError::TransportError("Cannot acknowledge: subscriber transport is not running".to_string())
        })?;
        handle.send(request).await
    }

    /// Snapshot of the subscriptions registered on the running transport.
    pub async fn active_subscriptions(&self) -> Vec<SubscriptionInfo> {
        match self.running_handle() {
            Some(handle) => handle.list_subscriptions().await,
            None => Vec::new(),
        }
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// End the session: clear every token, release the HTTP pool and stop
    /// the subscriber transport, aborting a start that is still in
    /// progress. Safe to call any number of times.
    pub async fn close(&self) {
        self.inner.tokens.clear();
        self.inner
            .http_client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.inner.close_signal.send_modify(|epoch| *epoch = epoch.wrapping_add(1));

        let transport = self.inner.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.shutdown().await;
            self.inner.set_view(TransportView::Closed);
        }
        log::debug!("[AUTH] Session closed for {}", self.inner.server_url);
    }

    /// Run `body` with the session and close it afterwards, whether `body`
    /// returns or panics. A panic is resumed once teardown is done.
    ///
    /// ```rust,no_run
    /// use vantiq_link::{resources, QueryParams, VantiqClient};
    ///
    /// # async fn example(client: VantiqClient) -> vantiq_link::Result<()> {
    /// let count = VantiqClient::scoped(client, |c| async move {
    ///     c.authenticate("alice", "secret").await?;
    ///     Ok::<_, vantiq_link::VantiqError>(c.count(resources::TYPES, None).await?.count)
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<F, Fut, T>(client: VantiqClient, body: F) -> T
    where
        F: FnOnce(VantiqClient) -> Fut,
        Fut: Future<Output = T>,
    {
        let outcome = AssertUnwindSafe(body(client.clone())).catch_unwind().await;
        client.close().await;
        match outcome {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Builder for configuring [`VantiqClient`] instances.
pub struct VantiqClientBuilder {
    server_url: Option<String>,
    api_version: String,
    tls: TlsMode,
    timeout: Option<Duration>,
    timeouts: VantiqTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    access_token: Option<String>,
    username: Option<String>,
}

impl VantiqClientBuilder {
    fn new() -> Self {
        Self {
            server_url: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            tls: TlsMode::default(),
            timeout: None,
            timeouts: VantiqTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::default(),
            access_token: None,
            username: None,
        }
    }

    /// Server root URL, e.g. `https://dev.vantiq.com`.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// HTTP request timeout. Overrides `timeouts().receive_timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full timeout configuration.
    ///
    /// ```rust,no_run
    /// use vantiq_link::{VantiqClient, VantiqTimeouts};
    ///
    /// # fn example() -> vantiq_link::Result<()> {
    /// let client = VantiqClient::builder()
    ///     .server_url("http://localhost:8080")
    ///     .timeouts(VantiqTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: VantiqTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Start the session with an existing access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn build(self) -> Result<VantiqClient> {
        let raw_url = self
            .server_url
            .ok_or_else(|| VantiqError::ConfigurationError("server_url is required".into()))?;

        let parsed = reqwest::Url::parse(raw_url.trim()).map_err(|e| {
            VantiqError::ConfigurationError(format!("Invalid server_url '{}': {}", raw_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VantiqError::ConfigurationError(format!(
                "server_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        let server_url = raw_url.trim().trim_end_matches('/').to_string();

        let api_version = self.api_version.trim().trim_start_matches('v').to_string();
        if api_version.is_empty() {
            return Err(VantiqError::ConfigurationError("api_version must not be empty".into()));
        }
        let ws_url = ws::resolve_ws_url(&server_url, &api_version)?;

        let request_timeout = Some(self.timeout.unwrap_or(self.timeouts.receive_timeout))
            .filter(|timeout| !VantiqTimeouts::is_no_timeout(*timeout));

        Ok(VantiqClient {
            inner: Arc::new(ClientInner {
                server_url,
                api_version,
                ws_url,
                tokens: Arc::new(TokenStore::new(self.access_token, self.username)),
                tls: self.tls,
                request_timeout,
                timeouts: self.timeouts,
                connection_options: self.connection_options,
                event_handlers: self.event_handlers,
                http_client: RwLock::new(None),
                transport: Mutex::new(None),
                close_signal: watch::channel(0).0,
                transport_view: RwLock::new(TransportView::Unstarted),
            }),
        })
    }
}
