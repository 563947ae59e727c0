//! The subscriber transport: one WebSocket per session, multiplexed across
//! every event subscription.
//!
//! A background task owns the socket. It:
//!
//! - validates the session's credentials when the socket opens
//! - sends registration and acknowledgement requests on behalf of callers
//! - routes inbound frames by their `X-Request-Id` header to the owning
//!   subscription's queue, turning each registration's confirmation into a
//!   `"connect"` event queued ahead of any `"message"`
//! - pings on an idle socket and treats a missed pong as a disconnect
//! - optionally reconnects, re-registering every subscription before the
//!   transport reports itself connected again

pub(crate) mod ws;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::auth::TokenStore;
use crate::error::{Result, VantiqError};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{
    ConnectionOptions, SubscriptionEvent, SubscriptionInfo, SubscriptionMessage, WsRequest,
};
use crate::timeouts::VantiqTimeouts;
use crate::tls::TlsMode;

use ws::WebSocketStream;

/// Maximum text frame size (64 MiB).
const MAX_WS_TEXT_MESSAGE_BYTES: usize = 64 << 20;

/// Effectively "never" without overflowing `Instant + Duration`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// How long `shutdown` waits for the background task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Lifecycle of the subscriber transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not started yet in this session.
    Unstarted,
    /// Opening the socket, validating credentials, or reconnecting.
    Connecting,
    /// Open, validated, and every known subscription registered.
    Connected,
    /// Closed. A later start creates a fresh transport.
    Disconnected,
}

/// What a subscription registers for.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    /// Event path; the correlation key for every frame of this subscription.
    pub request_id: String,
    pub resource_kind: String,
    pub resource_id: String,
    pub params: Option<Map<String, JsonValue>>,
}

impl Registration {
    fn persistent(&self) -> bool {
        self.params
            .as_ref()
            .and_then(|params| params.get("persistent"))
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    fn to_request(&self, access_token: Option<&str>) -> WsRequest {
        WsRequest::subscribe(access_token, &self.request_id, self.params.as_ref())
    }
}

/// Everything the background task needs to (re)connect.
#[derive(Clone)]
pub(crate) struct TransportConfig {
    pub ws_url: String,
    pub tokens: Arc<TokenStore>,
    pub tls: TlsMode,
    pub timeouts: VantiqTimeouts,
    pub connection_options: ConnectionOptions,
    pub event_handlers: EventHandlers,
}

// ── Commands ────────────────────────────────────────────────────────────────

enum ConnCmd {
    /// Register a subscription; answered with the server's confirmation
    /// frame (which may carry a failure status).
    Subscribe {
        registration: Registration,
        event_tx: mpsc::UnboundedSender<SubscriptionEvent>,
        result_tx: oneshot::Sender<Result<SubscriptionMessage>>,
    },
    /// The caller stopped waiting for a registration's confirmation.
    Abandon { request_id: String },
    /// Send a request that expects no correlated reply (acknowledgements).
    Send {
        request: WsRequest,
        result_tx: oneshot::Sender<Result<()>>,
    },
    ListSubscriptions {
        result_tx: oneshot::Sender<Vec<SubscriptionInfo>>,
    },
    Shutdown,
}

// ── Per-subscription state ──────────────────────────────────────────────────

struct PendingSub {
    registration: Registration,
    event_tx: mpsc::UnboundedSender<SubscriptionEvent>,
    result_tx: oneshot::Sender<Result<SubscriptionMessage>>,
}

struct SubEntry {
    registration: Registration,
    event_tx: mpsc::UnboundedSender<SubscriptionEvent>,
    subscription_name: Option<String>,
    created_at_ms: u64,
    last_event_time_ms: Option<u64>,
}

fn snapshot_subscriptions(subs: &HashMap<String, SubEntry>) -> Vec<SubscriptionInfo> {
    let mut infos: Vec<SubscriptionInfo> = subs
        .values()
        .map(|entry| SubscriptionInfo {
            request_id: entry.registration.request_id.clone(),
            resource_kind: entry.registration.resource_kind.clone(),
            resource_id: entry.registration.resource_id.clone(),
            subscription_name: entry.subscription_name.clone(),
            persistent: entry.registration.persistent(),
            created_at_ms: entry.created_at_ms,
            last_event_time_ms: entry.last_event_time_ms,
        })
        .collect();
    infos.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.request_id.cmp(&b.request_id)));
    infos
}

// ── Public handles ──────────────────────────────────────────────────────────

/// Cloneable handle for talking to a running transport without holding
/// the session's transport lock.
#[derive(Clone)]
pub(crate) struct TransportHandle {
    cmd_tx: mpsc::Sender<ConnCmd>,
    state_rx: watch::Receiver<TransportState>,
    subscribe_timeout: Duration,
}

impl TransportHandle {
    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// Register a subscription and wait for the server's confirmation.
    ///
    /// On a successful confirmation the `"connect"` event is already queued
    /// on `event_tx` when this returns.
    pub async fn subscribe(
        &self,
        registration: Registration,
        event_tx: mpsc::UnboundedSender<SubscriptionEvent>,
    ) -> Result<SubscriptionMessage> {
        let request_id = registration.request_id.clone();
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Subscribe {
                registration,
                event_tx,
                result_tx,
            })
            .await
            .map_err(|_| not_running())?;

        let confirmation = if VantiqTimeouts::is_no_timeout(self.subscribe_timeout) {
            result_rx.await
        } else {
            match tokio::time::timeout(self.subscribe_timeout, result_rx).await {
                Ok(confirmation) => confirmation,
                Err(_) => {
                    // result_rx is gone, so the task can tell this entry is stale.
                    let _ = self
                        .cmd_tx
                        .send(ConnCmd::Abandon {
                            request_id: request_id.clone(),
                        })
                        .await;
                    return Err(VantiqError::TimeoutError(format!(
                        "No confirmation for subscription '{}' within {:?}",
                        request_id, self.subscribe_timeout
                    )));
                },
            }
        };

        confirmation.map_err(|_| {
            VantiqError::TransportError(
                "Subscriber transport stopped before confirming the subscription".to_string(),
            )
        })?
    }

    /// Send a request on the socket without waiting for a reply.
    pub async fn send(&self, request: WsRequest) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Send { request, result_tx })
            .await
            .map_err(|_| not_running())?;
        result_rx.await.map_err(|_| not_running())?
    }

    pub async fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let (result_tx, result_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ConnCmd::ListSubscriptions { result_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        result_rx.await.unwrap_or_default()
    }
}

fn not_running() -> VantiqError {
    VantiqError::TransportError("Subscriber transport is not running".to_string())
}

/// Owner of the background task. Dropping it signals shutdown.
pub(crate) struct SubscriberTransport {
    handle: TransportHandle,
    task: Option<JoinHandle<()>>,
}

impl SubscriberTransport {
    /// Spawn the background task and wait until the socket is open and its
    /// credentials are accepted.
    ///
    /// A change on `closed` while waiting aborts the start.
    pub async fn start(config: TransportConfig, mut closed: watch::Receiver<u64>) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(256);
        let (state_tx, state_rx) = watch::channel(TransportState::Connecting);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let subscribe_timeout = config.timeouts.subscribe_timeout;

        let task = tokio::spawn(async move {
            let task = ConnectionTask {
                config,
                cmd_rx,
                state_tx,
                pending: HashMap::new(),
                subs: HashMap::new(),
            };
            task.run(ready_tx).await;
        });

        let session_closed = async move {
            if closed.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let ready = tokio::select! {
            ready = ready_rx => ready,
            _ = session_closed => {
                log::info!("[WS] Session closed while the subscriber transport was starting");
                task.abort();
                return Err(VantiqError::TransportError(
                    "Session closed while the subscriber transport was starting".to_string(),
                ));
            }
        };

        match ready {
            Ok(Ok(())) => Ok(Self {
                handle: TransportHandle {
                    cmd_tx,
                    state_rx,
                    subscribe_timeout,
                },
                task: Some(task),
            }),
            Ok(Err(e)) => {
                log::warn!("[WS] Subscriber transport failed to start: {}", e);
                Err(e)
            },
            Err(_) => Err(VantiqError::TransportError(
                "Subscriber transport exited before signalling readiness".to_string(),
            )),
        }
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> TransportState {
        self.handle.state()
    }

    /// Close the socket and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.handle.cmd_tx.send(ConnCmd::Shutdown).await;
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                log::warn!("[WS] Subscriber transport did not stop within {:?}; aborting", SHUTDOWN_GRACE);
                task.abort();
            }
        }
    }
}

impl Drop for SubscriberTransport {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.handle.cmd_tx.try_send(ConnCmd::Shutdown);
        }
    }
}

// ── Background task ─────────────────────────────────────────────────────────

/// Why the serve loop returned.
enum Exit {
    Shutdown,
    Dropped(DisconnectReason),
}

struct ConnectionTask {
    config: TransportConfig,
    cmd_rx: mpsc::Receiver<ConnCmd>,
    state_tx: watch::Sender<TransportState>,
    pending: HashMap<String, PendingSub>,
    subs: HashMap<String, SubEntry>,
}

impl ConnectionTask {
    fn set_state(&self, state: TransportState) {
        self.state_tx.send_replace(state);
    }

    fn handlers(&self) -> &EventHandlers {
        &self.config.event_handlers
    }

    async fn connect(&self) -> Result<WebSocketStream> {
        let token = self.config.tokens.access_token();
        ws::establish_ws(
            &self.config.ws_url,
            token.as_deref(),
            &self.config.tls,
            &self.config.timeouts,
            &self.config.event_handlers,
        )
        .await
    }

    /// Lifecycle:
    /// 1. Connect and validate credentials
    /// 2. Serve commands, frames and keepalive until shutdown or drop
    /// 3. On drop: stop, or reconnect and re-register when enabled
    async fn run(mut self, ready_tx: oneshot::Sender<Result<()>>) {
        let mut ws_stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(TransportState::Disconnected);
                let _ = ready_tx.send(Err(e));
                return;
            },
        };
        self.set_state(TransportState::Connected);
        self.handlers().emit_connect();
        let _ = ready_tx.send(Ok(()));

        loop {
            match self.serve(&mut ws_stream).await {
                Exit::Shutdown => {
                    let _ = ws_stream.close(None).await;
                    self.fail_pending("Subscriber transport closed");
                    self.subs.clear();
                    self.set_state(TransportState::Disconnected);
                    self.handlers().emit_disconnect(DisconnectReason::new("Client disconnected"));
                    log::info!("[WS] Subscriber transport closed");
                    return;
                },
                Exit::Dropped(reason) => {
                    log::warn!("[WS] Subscriber transport lost: {}", reason);
                    self.handlers().emit_disconnect(reason);
                    self.fail_pending("Subscriber transport connection lost");

                    if !self.config.connection_options.auto_reconnect {
                        self.subs.clear();
                        self.set_state(TransportState::Disconnected);
                        return;
                    }

                    self.set_state(TransportState::Connecting);
                    match self.reconnect().await {
                        Some(stream) => {
                            ws_stream = stream;
                            self.set_state(TransportState::Connected);
                            self.handlers().emit_connect();
                        },
                        None => {
                            self.subs.clear();
                            self.set_state(TransportState::Disconnected);
                            return;
                        },
                    }
                },
            }
        }
    }

    fn fail_pending(&mut self, message: &str) {
        for (_, pending) in self.pending.drain() {
            let _ = pending
                .result_tx
                .send(Err(VantiqError::TransportError(message.to_string())));
        }
    }

    /// Multiplex socket reads, commands, keepalive and pong timeout.
    async fn serve(&mut self, ws: &mut WebSocketStream) -> Exit {
        let timeouts = &self.config.timeouts;
        let has_keepalive = !timeouts.keepalive_interval.is_zero();
        let keepalive_dur = if has_keepalive {
            timeouts.keepalive_interval
        } else {
            FAR_FUTURE
        };
        let pong_timeout_dur = timeouts.pong_timeout;
        let has_pong_timeout = has_keepalive && !pong_timeout_dur.is_zero();

        let mut idle_deadline = TokioInstant::now() + keepalive_dur;
        let mut awaiting_pong = false;
        let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

        loop {
            let idle_sleep = tokio::time::sleep_until(idle_deadline);
            tokio::pin!(idle_sleep);
            let pong_sleep = tokio::time::sleep_until(pong_deadline);
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                    return Exit::Dropped(DisconnectReason::new(format!(
                        "Pong timeout ({:?}), server unresponsive",
                        pong_timeout_dur
                    )));
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Subscribe { registration, event_tx, result_tx }) => {
                            if let Err(e) = self.register(ws, registration, event_tx, result_tx).await {
                                return Exit::Dropped(DisconnectReason::new(e.to_string()));
                            }
                        },
                        Some(ConnCmd::Abandon { request_id }) => self.abandon(&request_id),
                        Some(ConnCmd::Send { request, result_tx }) => {
                            let result = ws::send_request(ws, &request, self.handlers()).await;
                            let failed = result.as_ref().err().map(ToString::to_string);
                            let _ = result_tx.send(result);
                            if let Some(e) = failed {
                                return Exit::Dropped(DisconnectReason::new(e));
                            }
                        },
                        Some(ConnCmd::ListSubscriptions { result_tx }) => {
                            let _ = result_tx.send(snapshot_subscriptions(&self.subs));
                        },
                        Some(ConnCmd::Shutdown) | None => return Exit::Shutdown,
                    }
                }

                _ = &mut idle_sleep, if has_keepalive && !awaiting_pong => {
                    log::debug!("[WS] Keepalive: sending Ping (interval={:?})", keepalive_dur);
                    if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                        return Exit::Dropped(DisconnectReason::new(format!("Keepalive ping failed: {}", e)));
                    }
                    self.handlers().emit_send("[ping]");
                    if has_pong_timeout {
                        awaiting_pong = true;
                        pong_deadline = TokioInstant::now() + pong_timeout_dur;
                    }
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                }

                frame = ws.next() => {
                    // Any frame proves the socket is alive.
                    idle_deadline = TokioInstant::now() + keepalive_dur;
                    if awaiting_pong {
                        awaiting_pong = false;
                        pong_deadline = TokioInstant::now() + FAR_FUTURE;
                    }

                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                                log::warn!("[WS] Dropping oversized frame ({} bytes)", text.len());
                                continue;
                            }
                            self.route(text.as_str());
                        },
                        Some(Ok(Message::Binary(data))) => match ws::decode_binary(&data) {
                            Ok(text) => self.route(&text),
                            Err(e) => {
                                log::warn!("[WS] {}", e);
                                self.handlers().emit_error(ConnectionError::new(e.to_string(), true));
                            },
                        },
                        Some(Ok(Message::Close(frame))) => {
                            let reason = match frame {
                                Some(f) => DisconnectReason::with_code(f.reason.as_str(), f.code.into()),
                                None => DisconnectReason::new("Server closed connection"),
                            };
                            return Exit::Dropped(reason);
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        },
                        Some(Ok(Message::Pong(_))) => {
                            log::debug!("[WS] Keepalive: received Pong");
                        },
                        Some(Ok(Message::Frame(_))) => {},
                        Some(Err(e)) => {
                            let msg = e.to_string();
                            self.handlers().emit_error(ConnectionError::new(&msg, true));
                            return Exit::Dropped(DisconnectReason::new(format!("WebSocket error: {}", msg)));
                        },
                        None => return Exit::Dropped(DisconnectReason::new("WebSocket stream ended")),
                    }
                }
            }
        }
    }

    /// Send a registration and park it until its confirmation frame arrives.
    /// `Err` means the socket is unusable.
    async fn register(
        &mut self,
        ws: &mut WebSocketStream,
        registration: Registration,
        event_tx: mpsc::UnboundedSender<SubscriptionEvent>,
        result_tx: oneshot::Sender<Result<SubscriptionMessage>>,
    ) -> Result<()> {
        let key = registration.request_id.clone();
        if let Some(previous) = self.pending.remove(&key) {
            let _ = previous.result_tx.send(Err(VantiqError::ValidationError(format!(
                "Subscription to '{}' was superseded by a newer subscribe",
                key
            ))));
        }

        let token = self.config.tokens.access_token();
        let request = registration.to_request(token.as_deref());
        log::debug!("[SUB] Registering '{}'", key);
        if let Err(e) = ws::send_request(ws, &request, self.handlers()).await {
            let message = e.to_string();
            let _ = result_tx.send(Err(e));
            return Err(VantiqError::TransportError(message));
        }

        self.pending.insert(
            key,
            PendingSub {
                registration,
                event_tx,
                result_tx,
            },
        );
        Ok(())
    }

    /// Deliver one inbound frame to its pending registration or subscription.
    /// Never waits on a dispatcher.
    fn route(&mut self, text: &str) {
        self.handlers().emit_receive(text);
        let msg = match ws::parse_frame(text) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("[WS] {}", e);
                return;
            },
        };
        let Some(key) = msg.request_id().map(str::to_string) else {
            log::debug!("[WS] Frame without {} (status {}), ignoring", crate::models::REQUEST_ID_HEADER, msg.status);
            return;
        };

        if let Some(pending) = self.pending.remove(&key) {
            self.confirm(key, pending, msg);
            return;
        }

        let Some(entry) = self.subs.get_mut(&key) else {
            log::debug!("[WS] No subscription for '{}'", key);
            return;
        };
        entry.last_event_time_ms = Some(now_ms());
        if entry.event_tx.send(SubscriptionEvent::Message(msg)).is_err() {
            log::debug!("[SUB] Dispatcher for '{}' is gone; dropping subscription", key);
            self.subs.remove(&key);
        }
    }

    /// The first frame for a registration: wire it on success, report the
    /// failure otherwise.
    fn confirm(&mut self, key: String, pending: PendingSub, msg: SubscriptionMessage) {
        if !msg.is_success() {
            log::warn!("[SUB] Registration of '{}' rejected with status {}", key, msg.status);
            let _ = pending.result_tx.send(Ok(msg));
            return;
        }
        if pending.result_tx.is_closed() {
            log::warn!("[SUB] Confirmation for '{}' arrived after the caller gave up; not wiring it", key);
            return;
        }

        if pending.event_tx.send(SubscriptionEvent::Connect(msg.clone())).is_err() {
            log::debug!("[SUB] Dispatcher for '{}' closed before its connect event", key);
        }

        let subscription_name = msg.subscription_name().map(str::to_string);
        log::info!("[SUB] Subscribed to '{}' (name={:?})", key, subscription_name);
        // A repeat subscribe to the same path replaces the earlier entry.
        self.subs.insert(
            key,
            SubEntry {
                registration: pending.registration,
                event_tx: pending.event_tx,
                subscription_name,
                created_at_ms: now_ms(),
                last_event_time_ms: None,
            },
        );
        let _ = pending.result_tx.send(Ok(msg));
    }

    /// Drop a pending registration whose caller timed out. A newer subscribe
    /// to the same path keeps its entry.
    fn abandon(&mut self, request_id: &str) {
        let stale = self
            .pending
            .get(request_id)
            .is_some_and(|pending| pending.result_tx.is_closed());
        if stale {
            log::debug!("[SUB] Caller gave up on '{}'; discarding its registration", request_id);
            self.pending.remove(request_id);
        }
    }

    /// Reconnect with exponential backoff. `None` on shutdown or when the
    /// attempt budget runs out.
    async fn reconnect(&mut self) -> Option<WebSocketStream> {
        let options = self.config.connection_options.clone();
        let mut attempt: u32 = 0;
        loop {
            if let Some(max) = options.max_reconnect_attempts {
                if attempt >= max {
                    log::warn!("[WS] Max reconnection attempts ({}) reached", max);
                    self.handlers().emit_error(ConnectionError::new(
                        format!("Max reconnection attempts ({}) reached", max),
                        false,
                    ));
                    return None;
                }
            }

            let delay = options.reconnect_delay(attempt);
            log::info!("[WS] Reconnecting in {:?} (attempt {})", delay, attempt + 1);
            if !self.wait_backoff(delay).await {
                return None;
            }
            attempt += 1;

            match self.connect().await {
                Ok(mut stream) => match self.resubscribe_all(&mut stream).await {
                    Ok(()) => {
                        log::info!("[WS] Reconnected; {} subscription(s) restored", self.subs.len());
                        return Some(stream);
                    },
                    Err(e) => {
                        log::warn!("[WS] Re-registration failed: {}", e);
                        self.handlers().emit_error(ConnectionError::new(e.to_string(), true));
                        let _ = stream.close(None).await;
                    },
                },
                Err(e) => log::warn!("[WS] Reconnection attempt {} failed: {}", attempt, e),
            }
        }
    }

    /// Sleep out a backoff delay while still answering commands.
    /// Returns `false` if shutdown was requested.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(ConnCmd::Subscribe { result_tx, .. }) => {
                        let _ = result_tx.send(Err(VantiqError::TransportError(
                            "Subscriber transport is reconnecting".to_string(),
                        )));
                    },
                    Some(ConnCmd::Send { result_tx, .. }) => {
                        let _ = result_tx.send(Err(VantiqError::TransportError(
                            "Subscriber transport is reconnecting".to_string(),
                        )));
                    },
                    Some(ConnCmd::ListSubscriptions { result_tx }) => {
                        let _ = result_tx.send(snapshot_subscriptions(&self.subs));
                    },
                    Some(ConnCmd::Abandon { request_id }) => self.abandon(&request_id),
                    Some(ConnCmd::Shutdown) | None => return false,
                },
                _ = &mut sleep => return true,
            }
        }
    }

    /// Re-register every known subscription on a fresh socket and wait for
    /// all confirmations. Confirmations are not re-delivered as `"connect"`.
    async fn resubscribe_all(&mut self, ws: &mut WebSocketStream) -> Result<()> {
        self.subs.retain(|_, entry| !entry.event_tx.is_closed());
        if self.subs.is_empty() {
            return Ok(());
        }

        log::info!("[SUB] Re-registering {} subscription(s)", self.subs.len());
        let token = self.config.tokens.access_token();
        let mut awaiting: HashSet<String> = HashSet::new();
        for (key, entry) in &self.subs {
            let request = entry.registration.to_request(token.as_deref());
            ws::send_request(ws, &request, &self.config.event_handlers).await?;
            awaiting.insert(key.clone());
        }

        let subscribe_timeout = self.config.timeouts.subscribe_timeout;
        let no_timeout = VantiqTimeouts::is_no_timeout(subscribe_timeout);
        let deadline = TokioInstant::now() + subscribe_timeout;

        while !awaiting.is_empty() {
            let next = if no_timeout {
                Ok(ws.next().await)
            } else {
                tokio::time::timeout_at(deadline, ws.next()).await
            };

            let text = match next {
                Ok(Some(Ok(Message::Text(text)))) => text.as_str().to_string(),
                Ok(Some(Ok(Message::Binary(data)))) => ws::decode_binary(&data)?,
                Ok(Some(Ok(Message::Ping(payload)))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                    continue;
                },
                Ok(Some(Ok(Message::Pong(_) | Message::Frame(_)))) => continue,
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    return Err(VantiqError::TransportError(
                        "Connection closed while re-registering subscriptions".to_string(),
                    ))
                },
                Ok(Some(Err(e))) => return Err(e.into()),
                Err(_) => {
                    return Err(VantiqError::TimeoutError(format!(
                        "{} subscription(s) not confirmed within {:?}",
                        awaiting.len(),
                        subscribe_timeout
                    )))
                },
            };

            let confirmation = ws::parse_frame(&text)
                .ok()
                .and_then(|msg| msg.request_id().map(str::to_string).map(|key| (key, msg)))
                .filter(|(key, _)| awaiting.contains(key));

            match confirmation {
                Some((key, msg)) if msg.is_success() => {
                    awaiting.remove(&key);
                    if let Some(entry) = self.subs.get_mut(&key) {
                        if let Some(name) = msg.subscription_name() {
                            entry.subscription_name = Some(name.to_string());
                        }
                    }
                },
                Some((key, msg)) => {
                    return Err(VantiqError::TransportError(format!(
                        "Re-registration of '{}' rejected with status {}",
                        key, msg.status
                    )))
                },
                // Deliveries for already-confirmed subscriptions.
                None => self.route(&text),
            }
        }
        Ok(())
    }
}
