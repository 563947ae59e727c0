//! Subscription metadata exposed to callers.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of a registered subscription.
///
/// Returned by [`VantiqClient::active_subscriptions`](crate::VantiqClient::active_subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Event path, also the correlation key (`X-Request-Id`).
    pub request_id: String,
    /// Resource kind the subscription targets, e.g. `system.topics`.
    pub resource_kind: String,
    /// Topic path, type name, service name or source name.
    pub resource_id: String,
    /// Server-issued subscription name from the registration confirmation.
    pub subscription_name: Option<String>,
    /// Whether the subscription was registered with `persistent: true`.
    pub persistent: bool,
    /// Millis since Unix epoch when the subscription was confirmed.
    pub created_at_ms: u64,
    /// Millis since Unix epoch of the last delivered message, if any.
    pub last_event_time_ms: Option<u64>,
}
