use std::time::Duration;

use crate::error::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Backoff
// ═══════════════════════════════════════════════════════════════

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `failures`-th consecutive failure (1-based):
    /// `initial * 2^(failures-1)`, capped at `max`.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(20);
        let delay = self.initial.saturating_mul(1u32 << exp);
        delay.min(self.max)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Session Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backoff: BackoffPolicy,
    /// Consecutive failed connect attempts before giving up. 0 = never give up.
    pub max_attempts: u32,
    /// Upper bound for one connect attempt; exceeding it counts as a failure.
    pub connect_timeout: Duration,
    /// Upper bound for the graceful disconnect on shutdown.
    pub disconnect_timeout: Duration,
    /// A link that stayed up this long before dropping resets the failure
    /// count. So does any delivered message.
    pub stable_after: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_attempts: 10,
            connect_timeout: Duration::from_secs(10),
            disconnect_timeout: Duration::from_secs(5),
            stable_after: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.backoff.initial.is_zero() {
            return Err(PipelineError::Config("backoff initial delay must be positive".into()));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(PipelineError::Config(format!(
                "backoff initial {:?} exceeds max {:?}",
                self.backoff.initial, self.backoff.max
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(PipelineError::Config("connect timeout must be positive".into()));
        }
        Ok(())
    }
}
