//! Rule Engine Bridge
//!
//! Sends a rule request for a URL to the privileged engine and
//! reconstructs a possibly-chunked response into one logical payload.
//!
//! The engine may answer in one shot or split the payload across chunks:
//! each reply carries `data`, a `chunked` marker and, while chunked, a
//! `more` marker. The bridge loops (an explicit accumulation loop, not
//! recursion), re-sending continuation requests until `more` goes false
//! or an unchunked reply arrives (treated as complete). The accumulated
//! string is then parsed as a rule-set payload.
//!
//! The bridge never retries: every transport failure is wrapped and
//! propagated, and retry policy belongs to the coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rw_core::RuleSet;

use crate::error::EngineError;

/// The single engine action the delivery process issues.
pub const ACTION_GET_RULES_FOR_HOST: &str = "getRulesForHost";

/// Continuation rounds beyond which a chunk stream is declared broken.
const MAX_CHUNK_ROUNDS: usize = 64;

// =============================================================================
// Wire Types
// =============================================================================

/// Request to the privileged engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub action: String,
    pub url: String,
    #[serde(rename = "fromBeginning")]
    pub from_beginning: bool,
}

impl EngineRequest {
    /// The opening request of a logical fetch.
    pub fn first(url: &str) -> Self {
        Self {
            action: ACTION_GET_RULES_FOR_HOST.to_string(),
            url: url.to_string(),
            from_beginning: true,
        }
    }

    /// A continuation request for an in-progress chunked response.
    pub fn continuation(url: &str) -> Self {
        Self {
            action: ACTION_GET_RULES_FOR_HOST.to_string(),
            url: url.to_string(),
            from_beginning: false,
        }
    }
}

/// Reply from the privileged engine. `data` may be empty; `chunked` and
/// `more` are absent on unchunked replies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineReply {
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub more: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<serde_json::Value>,
}

impl EngineReply {
    pub fn complete(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn chunk(data: impl Into<String>, more: bool) -> Self {
        Self {
            data: data.into(),
            chunked: Some(true),
            more: Some(more),
            ..Self::default()
        }
    }
}

// =============================================================================
// Transport Seam
// =============================================================================

/// One request/response round trip to the privileged engine process.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    async fn round_trip(&self, request: EngineRequest) -> Result<EngineReply, EngineError>;
}

#[async_trait]
impl<T: EngineTransport + ?Sized> EngineTransport for std::sync::Arc<T> {
    async fn round_trip(&self, request: EngineRequest) -> Result<EngineReply, EngineError> {
        (**self).round_trip(request).await
    }
}

// =============================================================================
// Bridge
// =============================================================================

pub struct EngineBridge<T> {
    transport: T,
}

impl<T: EngineTransport> EngineBridge<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Fetch and parse the rule set for a URL.
    pub async fn fetch_rules(&self, url: &str) -> Result<RuleSet, EngineError> {
        let payload = self.fetch_payload(url).await?;
        RuleSet::from_json(&payload)
            .map_err(|e| EngineError::MalformedResponse(e.to_string()))
    }

    /// Fetch the raw payload, reassembling chunks.
    pub async fn fetch_payload(&self, url: &str) -> Result<String, EngineError> {
        let mut accumulated = String::new();
        let mut request = EngineRequest::first(url);
        let mut rounds = 0usize;

        loop {
            let reply = self.transport.round_trip(request).await?;
            if let Some(error) = reply.error {
                return Err(EngineError::EngineReported(error));
            }

            accumulated.push_str(&reply.data);

            let chunked = reply.chunked.unwrap_or(false);
            let more = reply.more.unwrap_or(false);
            // An unchunked reply is complete even mid-stream
            if !chunked || !more {
                return Ok(accumulated);
            }

            rounds += 1;
            if rounds >= MAX_CHUNK_ROUNDS {
                return Err(EngineError::MalformedResponse(format!(
                    "chunk stream did not terminate within {MAX_CHUNK_ROUNDS} rounds"
                )));
            }
            request = EngineRequest::continuation(url);
        }
    }
}
