use std::path::Path;

use crate::config::LogFileNaming;

/// Next free sequence number in `dir` for files named `{prefix}{digits}{suffix}`.
///
/// Returns the highest number found plus one, or 1 when nothing matches.
/// Entries that do not parse are skipped. Fails when the directory cannot
/// be listed, or when the highest number leaves no successor.
pub fn next_sequence_number(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<u64> {
    let naming = LogFileNaming::new(dir, prefix, suffix);
    next_sequence_for(&naming)
}

/// Same as [`next_sequence_number`], driven by a naming convention.
pub fn next_sequence_for(naming: &LogFileNaming) -> std::io::Result<u64> {
    let mut max: Option<u64> = None;
    for entry in std::fs::read_dir(&naming.dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(n) = naming.parse_sequence(name) {
            max = Some(max.map_or(n, |m| m.max(n)));
        }
    }
    match max {
        None => Ok(1),
        Some(m) => m.checked_add(1).ok_or_else(|| {
            std::io::Error::other(format!("no sequence number left after {m}"))
        }),
    }
}
