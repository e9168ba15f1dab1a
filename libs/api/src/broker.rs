use std::future::Future;
use std::pin::Pin;

use crate::error::BridgeError;

/// Topic filter matching every topic, nested levels included.
pub const ALL_TOPICS: &str = "#";

// ════════════════════════════════════════════════════════════════
//  Session state
// ════════════════════════════════════════════════════════════════

/// Lifecycle of a broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected => f.write_str("connected"),
            SessionState::ShuttingDown => f.write_str("shutting_down"),
        }
    }
}

/// Delivery guarantee requested for the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryQos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl DeliveryQos {
    /// Map the numeric MQTT level (0..=2).
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(DeliveryQos::AtMostOnce),
            1 => Some(DeliveryQos::AtLeastOnce),
            2 => Some(DeliveryQos::ExactlyOnce),
            _ => None,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Broker collaborator
// ════════════════════════════════════════════════════════════════

/// Event delivered by a connected broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A publish arrived on `topic`.
    Message { topic: String, payload: Vec<u8> },
    /// The connection was lost. The client must be reconnected
    /// before any further `next_event` call.
    Disconnected { reason: String },
}

/// Connect / subscribe / receive primitives of a pub/sub client.
///
/// Implementations own the wire protocol. The session drives them
/// strictly sequentially: `connect`, `subscribe`, then `next_event`
/// until `Disconnected`, then `connect` again.
pub trait BrokerClient: Send {
    /// Human-readable broker address for logs.
    fn endpoint(&self) -> String;

    /// Open a fresh connection and wait for the broker acknowledgment.
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>>;

    /// Subscribe to a topic filter on the current connection.
    fn subscribe(
        &mut self,
        filter: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>>;

    /// Wait for the next message or for the connection to drop.
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = BrokerEvent> + Send + '_>>;

    /// Close the current connection gracefully.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>>;
}
