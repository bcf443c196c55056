//! Delivery-process configuration
//!
//! One struct, serde-deserializable from a JSON config file, with defaults
//! matching the shipped constants. Durations are plain millisecond fields
//! so config files stay unit-explicit.

use std::time::Duration;

use serde::Deserialize;

/// Hostnames warmed into the pinned cache at process start.
pub const DEFAULT_PINNED_HOSTNAMES: &[&str] = &[
    "google.com",
    "www.google.com",
    "youtube.com",
    "www.youtube.com",
    "facebook.com",
    "www.facebook.com",
    "wikipedia.org",
    "en.wikipedia.org",
    "amazon.com",
    "www.amazon.com",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    /// Bounded cache capacity (entries)
    pub cache_max_entries: usize,
    /// Bounded cache TTL, milliseconds
    pub cache_ttl_ms: u64,
    /// Retry attempt ceiling per fetch (first try included)
    pub max_attempts: u32,
    /// Exponential backoff base delay, milliseconds
    pub retry_base_delay_ms: u64,
    /// Upper bound on random backoff jitter, milliseconds
    pub max_jitter_ms: u64,
    /// Gateway request timeout, milliseconds
    pub request_timeout_ms: u64,
    /// Concurrent engine fetch limit; excess fetches queue
    pub max_parallel_fetches: usize,
    /// Pinned-cache hostname allow-list
    pub pinned_hostnames: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            cache_max_entries: 1000,
            cache_ttl_ms: 40 * 60 * 1000,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            max_jitter_ms: 250,
            request_timeout_ms: 30_000,
            max_parallel_fetches: 8,
            pinned_hostnames: DEFAULT_PINNED_HOSTNAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DeliveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
