//! Exponential backoff shared by parameter reads and certificate polling.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Multiplier applied after every retry
    pub factor: u32,
    /// Upper bound on a single delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            factor: factor.max(1),
            max_delay,
        }
    }

    /// Start a fresh sequence of delays
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial_delay.min(self.max_delay),
            factor: self.factor.max(1),
            max: self.max_delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2, Duration::from_secs(30))
    }
}

/// Iterator over backoff delays; never ends, callers bound it by deadline
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    factor: u32,
    max: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_mul(self.factor).min(self.max);
        Some(current)
    }
}

/// Serialize `Duration` as whole seconds in config files
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
