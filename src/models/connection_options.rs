use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the subscriber transport does when its socket drops unexpectedly.
///
/// With `auto_reconnect` off (the default) a drop is terminal: existing
/// subscriptions are discarded and the next `subscribe` opens a fresh
/// socket. With it on, the transport re-opens the socket, re-validates, and
/// re-registers every subscription.
///
/// ```rust
/// use vantiq_link::ConnectionOptions;
///
/// let options: ConnectionOptions =
///     serde_json::from_str(r#"{ "auto_reconnect": true, "max_reconnect_attempts": 3 }"#).unwrap();
/// assert_eq!(options.reconnect_delay_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub auto_reconnect: bool,
    /// Wait before the first attempt; doubled on each further attempt.
    pub reconnect_delay_ms: u64,
    /// Upper bound on the doubled wait.
    pub max_reconnect_delay_ms: u64,
    /// `None` retries until `close()`.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            max_reconnect_attempts: None,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_reconnect(self, auto_reconnect: bool) -> Self {
        Self { auto_reconnect, ..self }
    }

    pub fn with_reconnect_delay_ms(self, reconnect_delay_ms: u64) -> Self {
        Self { reconnect_delay_ms, ..self }
    }

    pub fn with_max_reconnect_delay_ms(self, max_reconnect_delay_ms: u64) -> Self {
        Self { max_reconnect_delay_ms, ..self }
    }

    pub fn with_max_reconnect_attempts(self, max_reconnect_attempts: Option<u32>) -> Self {
        Self { max_reconnect_attempts, ..self }
    }

    /// Wait before reconnect attempt `attempt`, counting from zero.
    pub(crate) fn reconnect_delay(&self, attempt: u32) -> Duration {
        let scaled = 1u64
            .checked_shl(attempt)
            .and_then(|factor| self.reconnect_delay_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        Duration::from_millis(scaled.min(self.max_reconnect_delay_ms))
    }
}
