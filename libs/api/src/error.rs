/// Category of a bridge error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure or missing acknowledgment, retried with backoff.
    Connect,
    /// The broker answered and said no (CONNACK or SUBACK failure code).
    Refused,
    /// Operation needs a live connection and there is none.
    NotConnected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connect => f.write_str("connect"),
            ErrorKind::Refused => f.write_str("refused"),
            ErrorKind::NotConnected => f.write_str("not_connected"),
        }
    }
}

/// Error raised by a broker client.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone)]
pub struct BridgeError {
    kind: ErrorKind,
    message: String,
}

impl BridgeError {
    pub fn connect(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connect, message: msg.into() }
    }

    pub fn refused(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Refused, message: msg.into() }
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::NotConnected, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Debug for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shows_kind_display_does_not() {
        let err = BridgeError::refused("subscribe '#' rejected");
        assert_eq!(err.kind(), ErrorKind::Refused);
        assert_eq!(err.to_string(), "subscribe '#' rejected");
        assert_eq!(format!("{err:?}"), "[refused] subscribe '#' rejected");
    }
}
