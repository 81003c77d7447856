//! Bounded retry with exponential backoff for request/reply exchanges (TALK, FILE, END).
//! Chunks are never retried.

use std::time::Duration;

use serde::Deserialize;

/// How many times a request is sent and how long to pause between attempts.
/// The default is a single attempt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total sends, including the first (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the pause after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Upper bound on any single pause.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_multiplier() -> u32 {
    2
}
fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::default()
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Pauses to take before each retry; yields `max_attempts - 1` values.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            remaining: self.max_attempts.saturating_sub(1),
            next_ms: self.initial_backoff_ms.min(self.max_backoff_ms),
            multiplier: u64::from(self.multiplier.max(1)),
            max_ms: self.max_backoff_ms,
        }
    }
}

/// Iterator over retry pauses.
#[derive(Debug, Clone)]
pub struct Backoff {
    remaining: u32,
    next_ms: u64,
    multiplier: u64,
    max_ms: u64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next_ms;
        self.next_ms = self.next_ms.saturating_mul(self.multiplier).min(self.max_ms);
        Some(Duration::from_millis(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_shot() {
        assert_eq!(RetryPolicy::default().backoff().count(), 0);
        assert_eq!(RetryPolicy::once().max_attempts, 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::once()
            .with_attempts(5)
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));
        let pauses: Vec<u64> = policy.backoff().map(|d| d.as_millis() as u64).collect();
        assert_eq!(pauses, vec![100, 200, 400, 500]);
    }

    #[test]
    fn zero_attempts_behaves_like_one() {
        assert_eq!(RetryPolicy::once().with_attempts(0).backoff().count(), 0);
    }
}
