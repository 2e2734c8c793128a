//! Retry backoff policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff growth strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles with every retry.
    Exponential,
}

/// Delay schedule between job attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Growth strategy.
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    /// Delay before the first retry.
    pub delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Random extra delay of up to this many milliseconds.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2))
    }
}

impl BackoffPolicy {
    /// Exponential backoff starting at `delay`.
    #[must_use]
    pub fn exponential(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay_ms: millis(delay),
            max_delay_ms: 300_000,
            jitter_ms: 0,
        }
    }

    /// Fixed backoff of `delay`.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay_ms: millis(delay),
            max_delay_ms: 300_000,
            jitter_ms: 0,
        }
    }

    /// Adds up to `jitter` of random extra delay.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter_ms = millis(jitter);
        self
    }

    /// Caps every delay at `max`.
    #[must_use]
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay_ms = millis(max);
        self
    }

    /// Returns the deterministic delay before retry number `retry`
    /// (1-based), before jitter.
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let raw = match self.kind {
            BackoffKind::Fixed => self.delay_ms,
            BackoffKind::Exponential => {
                let exponent = retry.saturating_sub(1).min(32);
                self.delay_ms.saturating_mul(1_u64 << exponent)
            }
        };
        Duration::from_millis(raw.min(self.max_delay_ms))
    }

    /// Returns the delay before retry number `retry`, with jitter applied.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_ms == 0 {
            return base;
        }
        let extra = rand::Rng::gen_range(&mut rand::thread_rng(), 0..=self.jitter_ms);
        base.saturating_add(Duration::from_millis(extra))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
