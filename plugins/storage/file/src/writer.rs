use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{LogFileNaming, RotationPolicy};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// The failed write left part of the line behind and it could not be cut off.
    #[error("write {}: {source} (partial line kept: {rollback})", path.display())]
    Torn {
        path: PathBuf,
        source: io::Error,
        rollback: io::Error,
    },

    #[error("rotation to {requested} does not advance past {current}")]
    SequenceNotAdvancing { current: u64, requested: u64 },

    #[error("no sequence number left after {current}")]
    SequenceExhausted { current: u64 },
}

/// An open log file, as far as the writer cares.
trait Segment: Write + Send {
    fn size(&self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Segment for File {
    fn size(&self) -> io::Result<u64> {
        self.metadata().map(|m| m.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

type Opener = Box<dyn FnMut(&Path) -> io::Result<Box<dyn Segment>> + Send>;

fn open_append(path: &Path) -> io::Result<Box<dyn Segment>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// The open file of the current sequence.
struct WriterHandle {
    file: Box<dyn Segment>,
    path: PathBuf,
    bytes_written: u64,
    opened_at: Instant,
}

impl WriterHandle {
    fn open(open: &mut Opener, path: PathBuf) -> Result<Self, WriteError> {
        let file = open(&path).map_err(|source| WriteError::Open { path: path.clone(), source })?;
        let bytes_written = file.size().unwrap_or(0);
        Ok(Self {
            file,
            path,
            bytes_written,
            opened_at: Instant::now(),
        })
    }

    /// Write the whole line or nothing: a failed write is cut back to
    /// where the line started.
    fn write_line(&mut self, line: &str) -> Result<(), WriteError> {
        let start = self.bytes_written;
        if let Err(source) = self.file.write_all(line.as_bytes()).and_then(|()| self.file.flush()) {
            let path = self.path.clone();
            return Err(match self.file.truncate(start) {
                Ok(()) => WriteError::Write { path, source },
                Err(rollback) => WriteError::Torn { path, source, rollback },
            });
        }
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    fn close(mut self) -> Result<(), WriteError> {
        self.file
            .flush()
            .map_err(|source| WriteError::Write { path: self.path.clone(), source })
    }
}

// ════════════════════════════════════════════════════════════════
//  DurableWriter
// ════════════════════════════════════════════════════════════════

/// Append-only writer over a series of sequence-numbered files.
///
/// The handle is opened on first append and kept open across calls.
/// Lines go straight to the file, unbuffered. A failed write is cut back
/// and retried once on a freshly opened handle after `retry_delay` (a
/// blocking sleep, so call it from a blocking context). If the cut-back
/// itself fails there is no retry.
pub struct DurableWriter {
    naming: LogFileNaming,
    sequence: u64,
    policy: RotationPolicy,
    retry_delay: Duration,
    open: Opener,
    handle: Option<WriterHandle>,
}

impl DurableWriter {
    pub fn new(
        naming: LogFileNaming,
        first_sequence: u64,
        policy: RotationPolicy,
        retry_delay: Duration,
    ) -> Self {
        Self {
            naming,
            sequence: first_sequence,
            policy,
            retry_delay,
            open: Box::new(open_append),
            handle: None,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn current_path(&self) -> PathBuf {
        self.naming.path_for(self.sequence)
    }

    /// Bytes in the current file, as far as this writer knows.
    pub fn bytes_written(&self) -> u64 {
        match &self.handle {
            Some(h) => h.bytes_written,
            None => file_len(&self.current_path()),
        }
    }

    /// Append one line (the caller supplies the trailing newline).
    pub fn append(&mut self, line: &str) -> Result<(), WriteError> {
        self.rotate_if_due(line.len() as u64)?;

        match self.try_append(line) {
            Ok(()) => Ok(()),
            Err(torn @ WriteError::Torn { .. }) => {
                self.handle = None;
                Err(torn)
            }
            Err(first) => {
                tracing::warn!(
                    path = %self.current_path().display(),
                    error = %first,
                    "write failed, retrying once"
                );
                self.handle = None;
                std::thread::sleep(self.retry_delay);
                self.try_append(line)
            }
        }
    }

    /// Close the current file and open the next sequence number.
    pub fn rotate(&mut self) -> Result<u64, WriteError> {
        let next = self
            .sequence
            .checked_add(1)
            .ok_or(WriteError::SequenceExhausted { current: self.sequence })?;
        self.rotate_to(next)?;
        Ok(next)
    }

    /// Close the current file and open `sequence`, which must be higher
    /// than the current one.
    pub fn rotate_to(&mut self, sequence: u64) -> Result<(), WriteError> {
        if sequence <= self.sequence {
            return Err(WriteError::SequenceNotAdvancing {
                current: self.sequence,
                requested: sequence,
            });
        }
        self.close()?;
        self.sequence = sequence;
        let path = self.current_path();
        let handle = WriterHandle::open(&mut self.open, path)?;
        tracing::info!(path = %handle.path.display(), sequence, "rotated log file");
        self.handle = Some(handle);
        Ok(())
    }

    /// Flush and release the current handle. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), WriteError> {
        match self.handle.take() {
            Some(handle) => handle.close(),
            None => Ok(()),
        }
    }

    fn try_append(&mut self, line: &str) -> Result<(), WriteError> {
        let mut handle = match self.handle.take() {
            Some(h) => h,
            None => {
                let path = self.current_path();
                WriterHandle::open(&mut self.open, path)?
            }
        };
        let result = handle.write_line(line);
        self.handle = Some(handle);
        result
    }

    fn rotate_if_due(&mut self, incoming: u64) -> Result<(), WriteError> {
        let size = self.bytes_written();
        let too_big = match self.policy.max_bytes {
            Some(max) => size > 0 && size + incoming > max,
            None => false,
        };
        let too_old = match (self.policy.max_age, &self.handle) {
            (Some(max_age), Some(h)) => h.opened_at.elapsed() >= max_age,
            _ => false,
        };
        if too_big || too_old {
            tracing::debug!(size, too_big, too_old, "rotation due");
            self.rotate()?;
        }
        Ok(())
    }
}

impl Drop for DurableWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "flush on drop failed");
        }
    }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
