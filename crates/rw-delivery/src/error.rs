//! Error types for the delivery pipeline
//!
//! Three failure domains, one enum each: talking to the privileged engine
//! (`EngineError`), resolving rules through the coordinator (`FetchError`),
//! and the page-facing gateway (`GatewayError`). All variants are `Clone`
//! because a single settled fetch is fanned out to every deduplicated
//! caller.

/// Failure talking to the privileged rule engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine not connected")]
    NotConnected,
    #[error("engine request timed out")]
    Timeout,
    #[error("malformed engine response: {0}")]
    MalformedResponse(String),
    #[error("engine reported error: {0}")]
    EngineReported(String),
}

impl EngineError {
    /// Terminal errors abort immediately; the retry policy never sees them.
    /// `EngineReported` is classified by message against the phrase list.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotConnected | Self::MalformedResponse(_))
    }
}

/// Failure resolving a rule set through the coordinator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("rule fetch failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("rule fetch aborted: {0}")]
    NonRetryable(String),
}

/// Failure on the page-side gateway channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway channel closed")]
    ChannelClosed,
    #[error("gateway remote error: {0}")]
    Remote(String),
}

impl GatewayError {
    /// A gateway timeout or a closed channel is never retried; `Remote`
    /// errors are classified by message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Timeout | Self::ChannelClosed)
    }
}
