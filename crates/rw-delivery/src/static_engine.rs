//! Static engine transport
//!
//! An in-process stand-in for the privileged rule engine, serving rule
//! payloads from a hostname-keyed map. Payloads above the configured
//! chunk size are split across continuation round trips, so the bridge's
//! reassembly path is exercised by tests and tooling against the same
//! protocol the real engine speaks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rw_core::url::extract_host;

use crate::bridge::{EngineReply, EngineRequest, EngineTransport, ACTION_GET_RULES_FOR_HOST};
use crate::error::EngineError;

/// Payload returned for hostnames with no rules: an empty rule set.
const EMPTY_PAYLOAD: &str = "{}";

pub struct StaticEngine {
    rules_by_host: HashMap<String, String>,
    chunk_size: usize,
    // In-progress chunked responses, keyed by request URL
    sessions: Mutex<HashMap<String, VecDeque<String>>>,
    round_trips: AtomicUsize,
}

impl StaticEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            rules_by_host: HashMap::new(),
            chunk_size: chunk_size.max(1),
            sessions: Mutex::new(HashMap::new()),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Register the rule payload (RuleSet JSON) served for a hostname.
    pub fn insert(&mut self, hostname: &str, payload: impl Into<String>) {
        self.rules_by_host
            .insert(hostname.to_ascii_lowercase(), payload.into());
    }

    /// Total round trips served. Observability for tests and tooling.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.rules_by_host.keys().cloned().collect()
    }

    fn payload_for(&self, url: &str) -> &str {
        extract_host(url)
            .and_then(|host| self.rules_by_host.get(&host.to_ascii_lowercase()))
            .map(String::as_str)
            .unwrap_or(EMPTY_PAYLOAD)
    }

    /// Split a payload on char boundaries into chunks of roughly
    /// `chunk_size` bytes.
    fn split_chunks(&self, payload: &str) -> VecDeque<String> {
        let mut chunks = VecDeque::new();
        let mut current = String::new();
        for ch in payload.chars() {
            current.push(ch);
            if current.len() >= self.chunk_size {
                chunks.push_back(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push_back(current);
        }
        chunks
    }
}

#[async_trait]
impl EngineTransport for StaticEngine {
    async fn round_trip(&self, request: EngineRequest) -> Result<EngineReply, EngineError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);

        if request.action != ACTION_GET_RULES_FOR_HOST {
            return Err(EngineError::EngineReported(format!(
                "unsupported action: {}",
                request.action
            )));
        }

        let mut sessions = self.sessions.lock().expect("session lock poisoned");

        if request.from_beginning {
            let payload = self.payload_for(&request.url);
            if payload.len() <= self.chunk_size {
                sessions.remove(&request.url);
                return Ok(EngineReply::complete(payload));
            }
            let mut chunks = self.split_chunks(payload);
            let first = chunks.pop_front().unwrap_or_default();
            let more = !chunks.is_empty();
            if more {
                sessions.insert(request.url.clone(), chunks);
            }
            return Ok(EngineReply::chunk(first, more));
        }

        // Continuation of an in-progress chunked response
        let Some(chunks) = sessions.get_mut(&request.url) else {
            return Err(EngineError::EngineReported(
                "no chunked response in progress".into(),
            ));
        };
        let data = chunks.pop_front().unwrap_or_default();
        let more = !chunks.is_empty();
        if !more {
            sessions.remove(&request.url);
        }
        Ok(EngineReply::chunk(data, more))
    }
}
