//! Preloader
//!
//! At process start the pinned cache is warmed for the configured
//! hostname list. Every hostname is fetched independently: one failure is
//! logged and never aborts the rest of the batch.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::bridge::EngineTransport;
use crate::coordinator::Coordinator;

pub struct Preloader<T: EngineTransport + 'static> {
    coordinator: Arc<Coordinator<T>>,
}

impl<T: EngineTransport + 'static> Preloader<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>) -> Self {
        Self { coordinator }
    }

    /// Warm the cache for each hostname. Returns the number of hostnames
    /// that resolved successfully; all outcomes settle before returning.
    pub async fn warm(&self, hostnames: &[String]) -> usize {
        let mut tasks = JoinSet::new();
        for hostname in hostnames {
            let coordinator = Arc::clone(&self.coordinator);
            let hostname = hostname.clone();
            tasks.spawn(async move {
                let url = format!("https://{hostname}/");
                match coordinator.resolve(&url).await {
                    Ok(set) => {
                        log::info!(
                            "warmed rules for {hostname}: {} rules ({})",
                            set.rule_count(),
                            set.source.as_str()
                        );
                        true
                    }
                    Err(err) => {
                        log::warn!("preload for {hostname} failed: {err}");
                        false
                    }
                }
            });
        }

        let mut warmed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => warmed += 1,
                Ok(false) => {}
                Err(err) => log::warn!("preload task failed to join: {err}"),
            }
        }
        warmed
    }
}
