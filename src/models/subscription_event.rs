use super::subscription_message::SubscriptionMessage;

/// What a subscription callback receives.
///
/// Every successful subscribe produces exactly one `Connect` first, carrying
/// the server's registration confirmation, followed by one `Message` per
/// delivered frame in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Connect(SubscriptionMessage),
    Message(SubscriptionMessage),
}

impl SubscriptionEvent {
    /// `"connect"` or `"message"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Message(_) => "message",
        }
    }

    pub fn message(&self) -> &SubscriptionMessage {
        match self {
            Self::Connect(msg) | Self::Message(msg) => msg,
        }
    }

    pub fn into_message(self) -> SubscriptionMessage {
        match self {
            Self::Connect(msg) | Self::Message(msg) => msg,
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}
