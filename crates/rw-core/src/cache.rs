//! Rule caches
//!
//! Two stores shield the privileged engine from redundant work:
//!
//! - [`RuleCache`]: bounded, URL-keyed, TTL-limited, LRU-evicted.
//! - [`PinnedCache`]: unbounded, hostname-keyed, no TTL, restricted to a
//!   fixed allow-list of high-traffic hostnames. Refreshed only by an
//!   explicit preload or engine-update notification, never evicted for
//!   capacity.
//!
//! Both are owned and mutated exclusively by the request coordinator.
//! Methods take an explicit `now` so TTL behavior is testable; the
//! `Instant::now()` convenience wrappers are what production code calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::RuleSet;

// =============================================================================
// Bounded Cache
// =============================================================================

struct CacheEntry {
    value: Arc<RuleSet>,
    inserted_at: Instant,
    last_access: Instant,
}

/// Bounded, time-limited rule cache with LRU eviction.
pub struct RuleCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl RuleCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Look up a live entry, refreshing its access time.
    /// An expired entry is evicted on the spot and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<Arc<RuleSet>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<Arc<RuleSet>> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.duration_since(entry.inserted_at) > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        Some(Arc::clone(&entry.value))
    }

    /// Insert a value, evicting the least-recently-used key at capacity.
    /// Re-inserting an existing key replaces it (a fresh insert after TTL
    /// expiry behaves identically).
    pub fn set(&mut self, key: impl Into<String>, value: Arc<RuleSet>) {
        self.set_at(key, value, Instant::now());
    }

    pub fn set_at(&mut self, key: impl Into<String>, value: Arc<RuleSet>, now: Instant) {
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Pinned Cache
// =============================================================================

/// Unbounded, non-expiring cache for a fixed allow-list of hostnames.
pub struct PinnedCache {
    entries: HashMap<String, Arc<RuleSet>>,
    allow_list: HashSet<String>,
}

impl PinnedCache {
    pub fn new(allowed_hostnames: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: HashMap::new(),
            allow_list: allowed_hostnames
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Is this hostname on the pinned allow-list?
    pub fn is_pinned_host(&self, hostname: &str) -> bool {
        self.allow_list.contains(&hostname.to_ascii_lowercase())
    }

    pub fn get(&self, hostname: &str) -> Option<Arc<RuleSet>> {
        self.entries.get(&hostname.to_ascii_lowercase()).cloned()
    }

    /// Store a value for an allow-listed hostname. Values for other
    /// hostnames are rejected with a warning; the bounded cache is the
    /// right home for them.
    pub fn set(&mut self, hostname: &str, value: Arc<RuleSet>) -> bool {
        let hostname = hostname.to_ascii_lowercase();
        if !self.allow_list.contains(&hostname) {
            log::warn!("refusing to pin rules for non-allow-listed hostname {hostname}");
            return false;
        }
        self.entries.insert(hostname, value);
        true
    }

    /// Pinned hostnames that currently hold a value.
    pub fn cached_hostnames(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// The full allow-list, cached or not.
    pub fn allowed_hostnames(&self) -> Vec<String> {
        self.allow_list.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
