use std::path::PathBuf;
use std::time::Duration;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// How payload bytes that are not valid UTF-8 are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDecoding {
    /// Drop invalid sequences.
    #[default]
    Ignore,
    /// Substitute U+FFFD for each invalid sequence.
    Replace,
}

/// When the writer moves on to the next sequence file on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before a write that would grow a non-empty file past this size.
    pub max_bytes: Option<u64>,
    /// Rotate before a write once the file has been open this long.
    pub max_age: Option<Duration>,
}

/// Naming convention for sequence files: `{dir}/{prefix}{NNN}{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileNaming {
    pub dir: PathBuf,
    pub prefix: String,
    pub suffix: String,
    /// Minimum number of digits, zero-padded.
    pub width: usize,
}

impl Default for LogFileNaming {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            prefix: "mqtt_log_".into(),
            suffix: ".txt".into(),
            width: 3,
        }
    }
}

impl LogFileNaming {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            ..Self::default()
        }
    }

    pub fn file_name(&self, seq: u64) -> String {
        format!("{}{:0width$}{}", self.prefix, seq, self.suffix, width = self.width)
    }

    pub fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(self.file_name(seq))
    }

    /// Parse the sequence number out of a file name, if it follows the convention.
    pub fn parse_sequence(&self, name: &str) -> Option<u64> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}
