//! Hooks observing the subscriber transport.
//!
//! Hooks run on the transport task, so they should return quickly. They see
//! the socket's lifecycle and its raw frames but cannot change what is
//! delivered to subscription handlers.
//!
//! ```rust,no_run
//! use vantiq_link::{EventHandlers, VantiqClient};
//!
//! # fn example() -> vantiq_link::Result<()> {
//! let client = VantiqClient::builder()
//!     .server_url("https://dev.vantiq.com")
//!     .event_handlers(
//!         EventHandlers::new()
//!             .on_connect(|| log::info!("subscriber socket validated"))
//!             .on_disconnect(|reason| log::warn!("subscriber socket lost: {}", reason)),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Why the subscriber socket went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub message: String,
    /// Close code from the server's Close frame, when one was received.
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            code: Some(code),
            ..Self::new(message)
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match self.code {
            Some(code) => write!(f, " [close {}]", code),
            None => Ok(()),
        }
    }
}

/// A transport failure reported through `on_error`.
///
/// `recoverable` is false for credential rejections, where reconnecting with
/// the same token cannot help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub message: String,
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type Hook<T> = Option<Arc<dyn Fn(T) + Send + Sync>>;

fn fire<T>(hook: &Hook<T>, value: T) {
    if let Some(hook) = hook {
        hook(value);
    }
}

/// Optional transport hooks. Cloning shares the registered closures.
#[derive(Clone, Default)]
pub struct EventHandlers {
    connect: Hook<()>,
    disconnect: Hook<DisconnectReason>,
    error: Hook<ConnectionError>,
    receive: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    send: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = [
            ("connect", self.connect.is_some()),
            ("disconnect", self.disconnect.is_some()),
            ("error", self.error.is_some()),
            ("receive", self.receive.is_some()),
            ("send", self.send.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        f.debug_tuple("EventHandlers").field(&registered).finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The socket is open and the server accepted its `validate` request.
    /// Fires again after each successful automatic reconnect.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Arc::new(move |()| f()));
        self
    }

    /// The socket closed, whether by `close()`, by the server, or by a
    /// missed keepalive.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Every inbound text frame, before it is decoded.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.receive = Some(Arc::new(f));
        self
    }

    /// Every outbound request frame, plus `"[ping]"` for keepalives.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.send = Some(Arc::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_none()
            && self.disconnect.is_none()
            && self.error.is_none()
            && self.receive.is_none()
            && self.send.is_none()
    }

    pub(crate) fn emit_connect(&self) {
        fire(&self.connect, ());
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        fire(&self.disconnect, reason);
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        fire(&self.error, error);
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(hook) = &self.receive {
            hook(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(hook) = &self.send {
            hook(raw);
        }
    }
}
