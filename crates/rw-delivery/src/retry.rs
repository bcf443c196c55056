//! Retry policy: exponential backoff with jitter
//!
//! Transient infrastructure errors are retried up to a fixed attempt
//! ceiling with `base * 2^(attempt-1)` delays plus random jitter. A fixed
//! set of error phrases is never retried: those failures are structural
//! and repeating the request cannot fix them.

use std::time::Duration;

use rand::Rng;

use rw_core::DeliveryConfig;

/// Error-message phrases that abort a retry loop immediately.
/// Matched case-insensitively as substrings.
pub const NON_RETRYABLE_PHRASES: &[&str] = &[
    "not connected",
    "invalid url",
    "url required",
    "json parse error",
    "no channel",
    "connection missing",
    "context invalidated",
    "malformed",
];

/// Ceiling on a single computed backoff delay (before jitter).
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt ceiling, first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay(),
            max_jitter: config.max_jitter(),
        }
    }

    /// Delay before the retry following failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(MAX_BACKOFF);
        base + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    /// Does this error message match the fixed non-retryable set?
    pub fn is_non_retryable(&self, message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        NON_RETRYABLE_PHRASES.iter().any(|p| message.contains(p))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, jitter_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(base_ms),
            max_jitter: Duration::from_millis(jitter_ms),
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let p = policy(500, 0);
        assert_eq!(p.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_capped() {
        let p = policy(500, 0);
        assert_eq!(p.backoff_delay(30), MAX_BACKOFF);
    }

    #[test]
    fn test_jitter_bounded() {
        let p = policy(100, 50);
        for _ in 0..64 {
            let d = p.backoff_delay(1);
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[test]
    fn test_non_retryable_phrases() {
        let p = policy(100, 0);
        assert!(p.is_non_retryable("Host Not Connected"));
        assert!(p.is_non_retryable("JSON parse error at line 3"));
        assert!(p.is_non_retryable("extension context invalidated"));
        assert!(p.is_non_retryable("Invalid URL: about:blank"));
        assert!(!p.is_non_retryable("engine request timed out"));
        assert!(!p.is_non_retryable("temporarily unavailable"));
    }
}
