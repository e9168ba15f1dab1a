//! Broker session → bounded queue → dispatch loop.
//!
//! ```text
//! BrokerSession::run ──push──▶ RecordQueue ──pop_blocking──▶ Dispatcher::run
//!   (tokio task)          (drop-oldest)           (blocking thread: file + console)
//! ```

pub mod config;
pub mod error;
mod dispatch;
mod queue;
mod session;

pub use config::{BackoffPolicy, SessionConfig};
pub use dispatch::{DispatchSummary, Dispatcher, spawn_dispatcher};
pub use error::PipelineError;
pub use queue::{PushOutcome, RecordQueue};
pub use session::{BrokerSession, SessionSummary};
