use chrono::{DateTime, Local};

/// One message received from the broker, stamped on arrival.
///
/// Created by the broker session, consumed and discarded by the
/// dispatch loop once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub topic: String,
    /// Raw payload bytes. Not required to be valid UTF-8.
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Record stamped with the current wall-clock time.
    pub fn now(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self::at(Local::now(), topic, payload)
    }

    pub fn at(
        timestamp: DateTime<Local>,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            timestamp,
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
