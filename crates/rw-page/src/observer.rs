//! Throttled DOM-mutation observer
//!
//! An explicit state machine replacing the disconnect → run callback →
//! reconnect observer pattern:
//!
//! ```text
//! Idle ──observe──▶ Observing ──mutation──▶ Draining ──done──▶ Observing
//! ```
//!
//! While `Draining`, mutations produced by the callback itself are not
//! re-observed: the baseline mutation count is re-read after the callback
//! completes. Mutations arriving inside the throttle window (20 ms by
//! default) coalesce into one trailing run.
//!
//! The observer is driven explicitly: callers bump the document and then
//! `tick` with the current time. `detach` releases the callback on page
//! teardown.

use std::time::{Duration, Instant};

use crate::dom::Document;

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    /// Not watching; callback released
    Idle,
    /// Watching for mutations
    Observing,
    /// Callback running; self-triggered mutations not observed
    Draining,
}

pub type ObserverCallback = Box<dyn FnMut(&mut Document)>;

pub struct MutationObserver {
    state: ObserverState,
    throttle: Duration,
    last_run: Option<Instant>,
    pending: bool,
    seen_mutations: u64,
    callback: Option<ObserverCallback>,
}

impl MutationObserver {
    pub fn new(callback: ObserverCallback) -> Self {
        Self::with_throttle(callback, DEFAULT_THROTTLE)
    }

    pub fn with_throttle(callback: ObserverCallback, throttle: Duration) -> Self {
        Self {
            state: ObserverState::Idle,
            throttle,
            last_run: None,
            pending: false,
            seen_mutations: 0,
            callback: Some(callback),
        }
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    /// Start observing, taking the current mutation count as baseline.
    pub fn observe(&mut self, doc: &Document) {
        if self.callback.is_some() {
            self.seen_mutations = doc.mutations();
            self.state = ObserverState::Observing;
        }
    }

    /// Stop observing and release the callback (page teardown).
    pub fn detach(&mut self) {
        self.state = ObserverState::Idle;
        self.pending = false;
        self.callback = None;
    }

    /// Drive the observer: runs the callback if mutations were observed
    /// since the last tick and the throttle window has elapsed. Returns
    /// true when the callback ran.
    pub fn tick(&mut self, doc: &mut Document, now: Instant) -> bool {
        if self.state != ObserverState::Observing {
            return false;
        }

        let changed = doc.mutations() != self.seen_mutations;
        if !changed && !self.pending {
            return false;
        }

        if let Some(last) = self.last_run {
            if now.duration_since(last) < self.throttle {
                // Coalesce into one trailing run
                self.pending = true;
                self.seen_mutations = doc.mutations();
                return false;
            }
        }

        self.run(doc, now);
        true
    }

    fn run(&mut self, doc: &mut Document, now: Instant) {
        self.state = ObserverState::Draining;
        if let Some(callback) = self.callback.as_mut() {
            callback(doc);
        }
        // Reconnect: self-triggered mutations are not observed
        self.seen_mutations = doc.mutations();
        self.pending = false;
        self.last_run = Some(now);
        self.state = ObserverState::Observing;
    }
}
