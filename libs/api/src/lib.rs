pub mod broker;
pub mod error;
pub mod record;

pub use broker::{ALL_TOPICS, BrokerClient, BrokerEvent, DeliveryQos, SessionState};
pub use error::{BridgeError, ErrorKind};
pub use record::LogRecord;
