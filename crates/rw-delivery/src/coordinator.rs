//! Request Coordinator
//!
//! The coordinator is the only component that talks to both the caches
//! and the engine bridge. For every cache key it guarantees at most one
//! outstanding engine call; any number of callers may await that call.
//!
//! A fetch runs in its own spawned task holding the singleflight slot, so
//! a caller that gives up (gateway timeout) never cancels the underlying
//! engine call; its eventual result still populates the cache for
//! future callers.
//!
//! Lifecycle: created at process start, bounded cache cleared on an
//! engine-update notification, torn down at process exit. Callers hold an
//! `Arc<Coordinator>`; no ambient globals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Semaphore};

use rw_core::cache::{PinnedCache, RuleCache};
use rw_core::types::{RuleSet, RuleSetSource};
use rw_core::url::page_hostname;
use rw_core::DeliveryConfig;

use crate::bridge::{EngineBridge, EngineTransport};
use crate::error::FetchError;
use crate::retry::RetryPolicy;

type FetchResult = Result<Arc<RuleSet>, FetchError>;
type PendingMap = HashMap<String, watch::Receiver<Option<FetchResult>>>;

struct Store {
    bounded: RuleCache,
    pinned: PinnedCache,
}

pub struct Coordinator<T: EngineTransport> {
    bridge: EngineBridge<T>,
    policy: RetryPolicy,
    store: Mutex<Store>,
    pending: Mutex<PendingMap>,
    fetch_slots: Semaphore,
}

impl<T: EngineTransport + 'static> Coordinator<T> {
    pub fn new(transport: T, config: &DeliveryConfig) -> Arc<Self> {
        Arc::new(Self {
            bridge: EngineBridge::new(transport),
            policy: RetryPolicy::from_config(config),
            store: Mutex::new(Store {
                bounded: RuleCache::new(config.cache_max_entries, config.cache_ttl()),
                pinned: PinnedCache::new(config.pinned_hostnames.iter().cloned()),
            }),
            pending: Mutex::new(HashMap::new()),
            fetch_slots: Semaphore::new(config.max_parallel_fetches.max(1)),
        })
    }

    /// Resolve the rule set for a page URL.
    ///
    /// Ineligible URLs (non-web scheme, empty or single-label host) get an
    /// empty `skipped` rule set: a normal outcome, never an error.
    pub async fn resolve(self: &Arc<Self>, url: &str) -> FetchResult {
        let Some(hostname) = page_hostname(url) else {
            log::debug!("skipping rules for non-filterable url {url}");
            return Ok(Arc::new(RuleSet::skipped()));
        };
        let hostname = hostname.to_ascii_lowercase();

        // Pinned by hostname first, then bounded by URL.
        let pinned_host = {
            let mut store = self.store.lock().expect("cache lock poisoned");
            if let Some(hit) = store.pinned.get(&hostname) {
                return Ok(Arc::new(hit.with_source(RuleSetSource::PinnedCache)));
            }
            if let Some(hit) = store.bounded.get(url) {
                return Ok(Arc::new(hit.with_source(RuleSetSource::Cache)));
            }
            store.pinned.is_pinned_host(&hostname)
        };

        // Dedup by the effective cache key: pinned hostnames share one
        // fetch across URLs, everything else is per-URL.
        let key = if pinned_host {
            hostname.clone()
        } else {
            url.to_string()
        };
        let mut rx = self.join_or_start_fetch(&key, url, &hostname);
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(FetchError::NonRetryable("pending fetch dropped".into()));
            }
        }
    }

    /// Subscribe to the in-flight fetch for a cache key, starting one if
    /// absent.
    fn join_or_start_fetch(
        self: &Arc<Self>,
        key: &str,
        url: &str,
        hostname: &str,
    ) -> watch::Receiver<Option<FetchResult>> {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        if let Some(rx) = pending.get(key) {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        pending.insert(key.to_string(), rx.clone());

        let this = Arc::clone(self);
        let key = key.to_string();
        let url = url.to_string();
        let hostname = hostname.to_string();
        tokio::spawn(async move {
            let result = this.fetch_and_store(&url, &hostname).await;
            // Remove before settling so late callers trigger a fresh attempt
            this.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&key);
            let _ = tx.send(Some(result));
        });
        rx
    }

    async fn fetch_and_store(&self, url: &str, hostname: &str) -> FetchResult {
        let _permit = match self.fetch_slots.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(FetchError::NonRetryable("coordinator shut down".into())),
        };

        let set = self.fetch_with_retry(url).await?;
        let set = Arc::new(set);

        let mut store = self.store.lock().expect("cache lock poisoned");
        if store.pinned.is_pinned_host(hostname) {
            store.pinned.set(hostname, Arc::clone(&set));
        } else {
            store.bounded.set(url, Arc::clone(&set));
        }
        Ok(set)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<RuleSet, FetchError> {
        let mut attempt: u32 = 1;
        loop {
            match self.bridge.fetch_rules(url).await {
                Ok(set) => return Ok(set),
                Err(err) => {
                    let message = err.to_string();
                    if err.is_terminal() || self.policy.is_non_retryable(&message) {
                        log::warn!("rule fetch for {url} aborted: {message}");
                        return Err(FetchError::NonRetryable(message));
                    }
                    if attempt >= self.policy.max_attempts {
                        log::warn!("rule fetch for {url} exhausted {attempt} attempts: {message}");
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: message,
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    log::debug!(
                        "rule fetch for {url} attempt {attempt} failed ({message}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Engine-update notification: drop every bounded entry, then refresh
    /// pinned entries in place. Pinned hostnames keep serving the stale
    /// value until the refetch lands; they never observe a cold cache.
    pub fn handle_rules_updated(self: &Arc<Self>) {
        let hostnames = {
            let mut store = self.store.lock().expect("cache lock poisoned");
            store.bounded.clear();
            store.pinned.cached_hostnames()
        };
        log::info!(
            "rules updated: bounded cache cleared, re-warming {} pinned hostnames",
            hostnames.len()
        );
        for hostname in hostnames {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.refresh_pinned(&hostname).await;
            });
        }
    }

    /// Refetch one pinned hostname, bypassing caches and dedup.
    async fn refresh_pinned(&self, hostname: &str) {
        let url = format!("https://{hostname}/");
        match self.fetch_with_retry(&url).await {
            Ok(set) => {
                let mut store = self.store.lock().expect("cache lock poisoned");
                store.pinned.set(hostname, Arc::new(set));
                log::debug!("re-warmed pinned rules for {hostname}");
            }
            Err(err) => {
                // Keep the stale entry; hot domains stay warm
                log::warn!("pinned re-warm for {hostname} failed: {err}");
            }
        }
    }

    /// (bounded entries, pinned entries). Observability only.
    pub fn cache_stats(&self) -> (usize, usize) {
        let store = self.store.lock().expect("cache lock poisoned");
        (store.bounded.len(), store.pinned.len())
    }

    /// Does this hostname currently hold a pinned entry?
    pub fn has_pinned(&self, hostname: &str) -> bool {
        let store = self.store.lock().expect("cache lock poisoned");
        store.pinned.get(hostname).is_some()
    }
}
