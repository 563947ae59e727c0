//! WebSocket plumbing for the subscriber transport: endpoint resolution,
//! connect with TLS policy and timeout, credential validation, frame
//! encode/decode.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::error::{Result, VantiqError};
use crate::event_handlers::{ConnectionError, EventHandlers};
use crate::models::{SubscriptionMessage, WsRequest};
use crate::timeouts::VantiqTimeouts;
use crate::tls::TlsMode;

pub(crate) type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path of the subscription endpoint below the server root.
fn ws_path(api_version: &str) -> String {
    format!("/api/v{}/wsock/websocket", api_version)
}

/// `http(s)://host[:port][/prefix]` → `ws(s)://host[:port][/prefix]/api/v<n>/wsock/websocket`.
///
/// A path prefix is kept so the socket goes through the same proxy route
/// as the REST calls.
pub(crate) fn resolve_ws_url(server_url: &str, api_version: &str) -> Result<String> {
    let base = Url::parse(server_url.trim()).map_err(|e| {
        VantiqError::ConfigurationError(format!("Invalid server_url '{}': {}", server_url, e))
    })?;

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(VantiqError::ConfigurationError(format!(
                "Unsupported server_url scheme '{}'; expected http(s)",
                other
            )))
        },
    };

    let mut ws_url = base.clone();
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        VantiqError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    let prefix = base.path().trim_end_matches('/').to_string();
    ws_url.set_path(&format!("{}{}", prefix, ws_path(api_version)));
    ws_url.set_query(None);
    ws_url.set_fragment(None);
    Ok(ws_url.to_string())
}

/// Open the socket, then validate the session's access token on it.
pub(crate) async fn establish_ws(
    ws_url: &str,
    access_token: Option<&str>,
    tls: &TlsMode,
    timeouts: &VantiqTimeouts,
    event_handlers: &EventHandlers,
) -> Result<WebSocketStream> {
    let Some(access_token) = access_token else {
        return Err(VantiqError::AuthenticationError(
            "Subscriptions require an authenticated session".to_string(),
        ));
    };

    log::debug!("[WS] Connecting to {}", ws_url);
    let connector = tls.ws_connector()?;
    let connect = tokio_tungstenite::connect_async_tls_with_config(ws_url, None, false, connector);

    let connect_result = if VantiqTimeouts::is_no_timeout(timeouts.connection_timeout) {
        Ok(connect.await)
    } else {
        tokio::time::timeout(timeouts.connection_timeout, connect).await
    };

    let mut ws_stream = match connect_result {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            let message = match status {
                401 => "Unauthorized: WebSocket requires valid credentials".to_string(),
                403 => "Forbidden: Access to WebSocket denied".to_string(),
                code => format!("WebSocket HTTP error: {}", code),
            };
            event_handlers.emit_error(ConnectionError::new(&message, false));
            return Err(if status == 401 || status == 403 {
                VantiqError::AuthenticationError(message)
            } else {
                VantiqError::TransportError(message)
            });
        },
        Ok(Err(e)) => {
            let msg = format!("Connection failed: {}", e);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(VantiqError::TransportError(msg));
        },
        Err(_) => {
            let msg = format!("Connection timeout ({:?})", timeouts.connection_timeout);
            event_handlers.emit_error(ConnectionError::new(&msg, true));
            return Err(VantiqError::TimeoutError(msg));
        },
    };

    log::debug!("[WS] Validating credentials (timeout={:?})", timeouts.auth_timeout);
    if let Err(e) = validate_and_wait(&mut ws_stream, access_token, timeouts.auth_timeout, event_handlers).await {
        event_handlers.emit_error(ConnectionError::new(e.to_string(), false));
        let _ = ws_stream.close(None).await;
        return Err(e);
    }
    log::info!("[WS] Subscriber transport connected to {}", ws_url);

    Ok(ws_stream)
}

/// Send the credential validation request and wait for its reply,
/// answering pings in the meantime.
async fn validate_and_wait(
    ws_stream: &mut WebSocketStream,
    access_token: &str,
    auth_timeout: Duration,
    event_handlers: &EventHandlers,
) -> Result<()> {
    send_request(ws_stream, &WsRequest::validate(access_token), event_handlers).await?;

    let no_timeout = VantiqTimeouts::is_no_timeout(auth_timeout);
    let deadline = TokioInstant::now() + auth_timeout;
    loop {
        let next = if no_timeout {
            Ok(ws_stream.next().await)
        } else {
            let remaining = deadline.saturating_duration_since(TokioInstant::now());
            if remaining.is_zero() {
                return Err(VantiqError::TimeoutError(format!(
                    "Credential validation timeout ({:?})",
                    auth_timeout
                )));
            }
            tokio::time::timeout(remaining, ws_stream.next()).await
        };

        let text = match next {
            Ok(Some(Ok(Message::Text(text)))) => text.as_str().to_string(),
            Ok(Some(Ok(Message::Binary(data)))) => decode_binary(&data)?,
            Ok(Some(Ok(Message::Ping(payload)))) => {
                let _ = ws_stream.send(Message::Pong(payload)).await;
                continue;
            },
            Ok(Some(Ok(Message::Pong(_) | Message::Frame(_)))) => continue,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                return Err(VantiqError::AuthenticationError(
                    "Server closed the connection during credential validation".to_string(),
                ))
            },
            Ok(Some(Err(e))) => return Err(e.into()),
            Err(_) => {
                return Err(VantiqError::TimeoutError(format!(
                    "Credential validation timeout ({:?})",
                    auth_timeout
                )))
            },
        };

        event_handlers.emit_receive(&text);
        let reply = parse_frame(&text)?;
        if reply.is_success() {
            return Ok(());
        }
        return Err(VantiqError::AuthenticationError(format!(
            "WebSocket credential validation failed (status {}): {}",
            reply.status, reply.body
        )));
    }
}

/// Serialize and send one request frame.
pub(crate) async fn send_request(
    ws_stream: &mut WebSocketStream,
    request: &WsRequest,
    event_handlers: &EventHandlers,
) -> Result<()> {
    let payload = serde_json::to_string(request)?;
    send_text(ws_stream, payload, event_handlers).await
}

pub(crate) async fn send_text(
    ws_stream: &mut WebSocketStream,
    payload: String,
    event_handlers: &EventHandlers,
) -> Result<()> {
    event_handlers.emit_send(&payload);
    ws_stream
        .send(Message::Text(payload.into()))
        .await
        .map_err(|e| VantiqError::TransportError(format!("Failed to send frame: {}", e)))
}

/// Binary frames carry the same JSON as text frames.
pub(crate) fn decode_binary(data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|e| {
        VantiqError::SerializationError(format!("Binary frame is not UTF-8: {}", e))
    })
}

/// Parse an inbound `{status, headers, body}` frame.
pub(crate) fn parse_frame(text: &str) -> Result<SubscriptionMessage> {
    serde_json::from_str(text).map_err(|e| {
        VantiqError::SerializationError(format!("Malformed subscription frame: {}", e))
    })
}
