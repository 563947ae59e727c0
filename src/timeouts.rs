//! Timers used by a session.
//!
//! HTTP requests use `receive_timeout`; the subscriber transport uses the
//! rest. Any timer set to zero is disabled.

use std::time::Duration;

/// Durations governing HTTP calls and the subscriber transport.
///
/// ```rust
/// use std::time::Duration;
/// use vantiq_link::VantiqTimeouts;
///
/// let timeouts = VantiqTimeouts::builder()
///     .receive_timeout(Duration::from_secs(120))
///     .subscribe_timeout_secs(20)
///     .keepalive_interval_secs(0) // no pings
///     .build();
/// assert_eq!(timeouts.auth_timeout, VantiqTimeouts::default().auth_timeout);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VantiqTimeouts {
    /// TCP connect plus TLS handshake, for HTTP and the WebSocket (10s).
    pub connection_timeout: Duration,
    /// One HTTP request/response cycle (30s). Downloads only time the
    /// response head.
    pub receive_timeout: Duration,
    /// Reply to the credential `validate` request on a new socket (5s).
    pub auth_timeout: Duration,
    /// Server confirmation of a subscription registration (10s).
    pub subscribe_timeout: Duration,
    /// Idle time before the transport sends a Ping (30s).
    pub keepalive_interval: Duration,
    /// How long after a Ping any frame must arrive before the socket is
    /// declared dead (10s). Ignored when keepalive is off.
    pub pong_timeout: Duration,
}

impl Default for VantiqTimeouts {
    fn default() -> Self {
        Self::from_secs([10, 30, 5, 10, 30, 10])
    }
}

impl VantiqTimeouts {
    // connection, receive, auth, subscribe, keepalive, pong
    const fn from_secs(secs: [u64; 6]) -> Self {
        Self {
            connection_timeout: Duration::from_secs(secs[0]),
            receive_timeout: Duration::from_secs(secs[1]),
            auth_timeout: Duration::from_secs(secs[2]),
            subscribe_timeout: Duration::from_secs(secs[3]),
            keepalive_interval: Duration::from_secs(secs[4]),
            pong_timeout: Duration::from_secs(secs[5]),
        }
    }

    pub fn builder() -> VantiqTimeoutsBuilder {
        VantiqTimeoutsBuilder {
            timeouts: Self::default(),
        }
    }

    /// For a server on localhost or the same network.
    pub fn fast() -> Self {
        Self::from_secs([2, 5, 2, 2, 15, 5])
    }

    /// For slow links or heavily loaded servers.
    pub fn relaxed() -> Self {
        Self::from_secs([30, 120, 15, 30, 60, 20])
    }

    /// Zero, or longer than a year, means "wait indefinitely".
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(365 * 24 * 3600)
    }
}

/// Builder for [`VantiqTimeouts`], starting from the defaults.
#[derive(Debug, Clone)]
pub struct VantiqTimeoutsBuilder {
    timeouts: VantiqTimeouts,
}

macro_rules! timeout_setters {
    ($($field:ident, $secs:ident;)*) => {
        $(
            pub fn $field(mut self, value: Duration) -> Self {
                self.timeouts.$field = value;
                self
            }

            pub fn $secs(self, secs: u64) -> Self {
                self.$field(Duration::from_secs(secs))
            }
        )*
    };
}

impl VantiqTimeoutsBuilder {
    timeout_setters! {
        connection_timeout, connection_timeout_secs;
        receive_timeout, receive_timeout_secs;
        auth_timeout, auth_timeout_secs;
        subscribe_timeout, subscribe_timeout_secs;
        keepalive_interval, keepalive_interval_secs;
        pong_timeout, pong_timeout_secs;
    }

    pub fn build(self) -> VantiqTimeouts {
        self.timeouts
    }
}
