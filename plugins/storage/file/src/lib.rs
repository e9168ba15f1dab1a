//! Sequence-numbered, append-only log files.
//!
//! On disk:
//! ```text
//! {dir}/{prefix}{NNN}{suffix}      e.g. logs/mqtt_log_001.txt
//! ```
//! Each line is `[YYYY-MM-DD HH:MM:SS] <topic>: <payload>`.

mod config;
mod line;
mod sequence;
mod writer;

pub use config::{LogFileNaming, PayloadDecoding, RotationPolicy};
pub use line::{
    ParseLineError, ParsedLine, TIMESTAMP_FORMAT, decode_payload, format_record, parse_line,
};
pub use sequence::{next_sequence_for, next_sequence_number};
pub use writer::{DurableWriter, WriteError};
