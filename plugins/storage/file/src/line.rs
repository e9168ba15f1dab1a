use chrono::NaiveDateTime;

use bridge_api::LogRecord;

use crate::config::PayloadDecoding;

/// Timestamp layout inside the square brackets.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a record as `[YYYY-MM-DD HH:MM:SS] <topic>: <payload>\n`.
pub fn format_record(record: &LogRecord, decoding: PayloadDecoding) -> String {
    let payload = decode_payload(&record.payload, decoding);
    format!(
        "[{}] {}: {}\n",
        record.timestamp.format(TIMESTAMP_FORMAT),
        record.topic,
        payload
    )
}

/// Decode payload bytes as UTF-8 without ever failing.
pub fn decode_payload(bytes: &[u8], decoding: PayloadDecoding) -> String {
    match decoding {
        PayloadDecoding::Replace => String::from_utf8_lossy(bytes).into_owned(),
        PayloadDecoding::Ignore => {
            let mut out = String::with_capacity(bytes.len());
            for chunk in bytes.utf8_chunks() {
                out.push_str(chunk.valid());
            }
            out
        }
    }
}

/// A log line split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: NaiveDateTime,
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseLineError {
    #[error("missing '[timestamp]' prefix")]
    MissingTimestamp,

    #[error("bad timestamp '{0}'")]
    BadTimestamp(String),

    #[error("missing ': ' topic separator")]
    MissingSeparator,
}

/// Parse a line produced by [`format_record`]. A trailing newline is optional.
///
/// The topic ends at the first `": "`, so topics containing that
/// sequence do not round-trip.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseLineError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let rest = line.strip_prefix('[').ok_or(ParseLineError::MissingTimestamp)?;
    let (ts, rest) = rest.split_once("] ").ok_or(ParseLineError::MissingTimestamp)?;
    let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map_err(|_| ParseLineError::BadTimestamp(ts.to_string()))?;
    let (topic, payload) = rest.split_once(": ").ok_or(ParseLineError::MissingSeparator)?;
    Ok(ParsedLine {
        timestamp,
        topic: topic.to_string(),
        payload: payload.to_string(),
    })
}
