use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use bridge_api::LogRecord;

/// Warn on the first drop, then once per this many.
const DROP_LOG_EVERY: u64 = 1000;

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full, the oldest record was discarded to make room.
    DroppedOldest,
    /// Queue is closed, the record was not accepted.
    Closed,
}

struct Inner {
    items: VecDeque<LogRecord>,
    closed: bool,
}

/// Bounded MPSC queue between the broker session and the dispatch loop.
///
/// `push` never blocks: when full, the oldest record is dropped and the
/// drop counter increments. `pop_blocking` parks the consumer until a
/// record arrives or the queue is closed and drained.
pub struct RecordQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl RecordQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: LogRecord) -> PushOutcome {
        let mut inner = self.lock();
        if inner.closed {
            return PushOutcome::Closed;
        }
        let outcome = if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                tracing::warn!(
                    dropped,
                    capacity = self.capacity,
                    "queue full, dropped oldest record"
                );
            }
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Queued
        };
        inner.items.push_back(record);
        drop(inner);
        self.not_empty.notify_one();
        outcome
    }

    /// Next record, blocking. `None` once closed and empty.
    pub fn pop_blocking(&self) -> Option<LogRecord> {
        let mut inner = self.lock();
        loop {
            if let Some(record) = inner.items.pop_front() {
                return Some(record);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Next record if one is ready.
    pub fn try_pop(&self) -> Option<LogRecord> {
        self.lock().items.pop_front()
    }

    /// Refuse further pushes and wake the consumer. Queued records stay poppable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
