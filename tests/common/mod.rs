#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value as JsonValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use vantiq_link::{VantiqClient, VantiqTimeouts};
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-access-token";

/// Start a wiremock server standing in for the REST surface.
pub async fn mock_http() -> MockServer {
    MockServer::start().await
}

/// A client for `server_url` that already holds [`TEST_TOKEN`].
pub fn client_for(server_url: &str) -> VantiqClient {
    VantiqClient::builder()
        .server_url(server_url)
        .access_token(TEST_TOKEN)
        .timeouts(
            VantiqTimeouts::builder()
                .connection_timeout_secs(5)
                .receive_timeout_secs(10)
                .auth_timeout_secs(5)
                .subscribe_timeout_secs(5)
                .build(),
        )
        .build()
        .expect("Failed to build client")
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run `fut` with a hard deadline so a hung test fails instead of stalling.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(15), fut)
        .await
        .expect("Test step timed out")
}

// ── In-process subscription server ──────────────────────────────────────────

#[derive(Clone, Debug)]
enum Outbound {
    Frame(String),
    Burst(Arc<Vec<String>>),
    Close,
}

struct WsState {
    token: String,
    /// Leave `validate` requests unanswered.
    stall_validation: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    received: Mutex<Vec<JsonValue>>,
    outbound: broadcast::Sender<Outbound>,
    next_name: AtomicU64,
    connections: AtomicUsize,
    /// Deliveries on persistent subscriptions not yet acknowledged,
    /// as (subscription name, sequence id).
    pending_acks: Mutex<Vec<(String, u64)>>,
}

impl WsState {
    fn reply_to(&self, request: &JsonValue) -> Option<JsonValue> {
        match request["op"].as_str() {
            Some("validate") if self.stall_validation.load(Ordering::SeqCst) => None,
            Some("validate") => {
                if request["object"].as_str() == Some(self.token.as_str()) {
                    Some(json!({ "status": 200, "headers": {}, "body": {} }))
                } else {
                    Some(json!({
                        "status": 401,
                        "headers": {},
                        "body": [{
                            "code": "io.vantiq.authentication.failed",
                            "message": "Invalid credentials",
                            "params": []
                        }]
                    }))
                }
            },
            Some("subscribe") => {
                let path = request["resourceId"].as_str().unwrap_or_default().to_string();
                if self.rejected.lock().unwrap().contains(&path) {
                    return Some(json!({
                        "status": 403,
                        "headers": { "X-Request-Id": path },
                        "body": [{
                            "code": "io.vantiq.security.unauthorized",
                            "message": format!("Not authorized to subscribe to {}", path),
                            "params": [path]
                        }]
                    }));
                }
                let n = self.next_name.fetch_add(1, Ordering::SeqCst) + 1;
                Some(json!({
                    "status": 200,
                    "headers": { "X-Request-Id": path },
                    "body": { "name": format!("sub-{}", n), "requestId": path }
                }))
            },
            Some("acknowledge") => {
                let params = &request["parameters"];
                let name = params["subscriptionName"].as_str().unwrap_or_default();
                let sequence = params["sequenceId"].as_u64().unwrap_or_default();
                self.pending_acks
                    .lock()
                    .unwrap()
                    .retain(|(sub, seq)| !(sub == name && *seq == sequence));
                None
            },
            _ => None,
        }
    }
}

/// Minimal server for the subscription protocol: validates the token,
/// confirms registrations with a `body.name`, pushes frames on demand and
/// records every request it receives.
pub struct MockWsServer {
    /// `http://127.0.0.1:<port>`; the client derives the `ws://` endpoint.
    pub url: String,
    state: Arc<WsState>,
    task: JoinHandle<()>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        Self::start_with_token(TEST_TOKEN).await
    }

    pub async fn start_with_token(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outbound, _) = broadcast::channel(1024);
        let state = Arc::new(WsState {
            token: token.to_string(),
            stall_validation: AtomicBool::new(false),
            rejected: Mutex::new(HashSet::new()),
            received: Mutex::new(Vec::new()),
            outbound,
            next_name: AtomicU64::new(0),
            connections: AtomicUsize::new(0),
            pending_acks: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(serve_connection(stream, state));
            }
        });

        Self {
            url: format!("http://{}", addr),
            state,
            task,
        }
    }

    /// Make registrations for `event_path` fail with a 403.
    pub fn reject(&self, event_path: &str) {
        self.state.rejected.lock().unwrap().insert(event_path.to_string());
    }

    /// Accept sockets but never answer their credential validation.
    pub fn stall_validation(&self) {
        self.state.stall_validation.store(true, Ordering::SeqCst);
    }

    fn delivery(event_path: &str, body: JsonValue) -> String {
        json!({
            "status": 200,
            "headers": { "X-Request-Id": event_path },
            "body": body
        })
        .to_string()
    }

    /// Push a delivery for `event_path` to every open connection.
    pub fn publish(&self, event_path: &str, body: JsonValue) {
        let _ = self
            .state
            .outbound
            .send(Outbound::Frame(Self::delivery(event_path, body)));
    }

    /// Push `count` deliveries `{"n": 0..count}` for `event_path` back to back.
    pub fn publish_burst(&self, event_path: &str, count: u64) {
        let frames = (0..count)
            .map(|n| Self::delivery(event_path, json!({ "n": n })))
            .collect();
        let _ = self.state.outbound.send(Outbound::Burst(Arc::new(frames)));
    }

    /// Push a reliable-topic delivery and remember it as unacknowledged.
    pub fn publish_reliable(&self, event_path: &str, subscription_name: &str, sequence_id: u64, value: JsonValue) {
        self.state
            .pending_acks
            .lock()
            .unwrap()
            .push((subscription_name.to_string(), sequence_id));
        self.publish(
            event_path,
            json!({
                "sequenceId": sequence_id,
                "partitionId": 0,
                "value": value
            }),
        );
    }

    /// Unacknowledged deliveries for `subscription_name`.
    pub fn pending_acks(&self, subscription_name: &str) -> usize {
        self.state
            .pending_acks
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == subscription_name)
            .count()
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        let _ = self.state.outbound.send(Outbound::Close);
    }

    /// Every request received so far, in arrival order.
    pub fn received(&self) -> Vec<JsonValue> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_ops(&self, op: &str) -> Vec<JsonValue> {
        self.received()
            .into_iter()
            .filter(|request| request["op"] == op)
            .collect()
    }

    /// Number of sockets accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<WsState>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut outbound = state.outbound.subscribe();

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<JsonValue>(text.as_str()) else {
                        continue;
                    };
                    state.received.lock().unwrap().push(request.clone());
                    if let Some(reply) = state.reply_to(&request) {
                        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {},
            },
            out = outbound.recv() => match out {
                Ok(Outbound::Frame(text)) => {
                    if ws.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                },
                Ok(Outbound::Burst(frames)) => {
                    for text in frames.iter() {
                        if ws.feed(Message::Text(text.clone().into())).await.is_err() {
                            return;
                        }
                    }
                    if ws.flush().await.is_err() {
                        return;
                    }
                },
                Ok(Outbound::Close) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = ws.close(None).await;
                    return;
                },
                Err(broadcast::error::RecvError::Lagged(_)) => {},
            },
        }
    }
}
