//! Messaging Gateway
//!
//! The per-page request/response channel between the page context and the
//! delivery process. The client side lives here: it races every request
//! against a fixed timeout (a timeout is terminal), classifies structured
//! remote errors against the non-retryable phrase list, and retries
//! retryable failures under the shared backoff policy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rw_core::{DeliveryConfig, RuleSet};

use crate::error::GatewayError;
use crate::retry::RetryPolicy;

// =============================================================================
// Wire Types
// =============================================================================

/// A page-to-delivery message, dispatched on its `action` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum GatewayRequest {
    /// Request the rule set for a page URL
    GetAdvancedBlockingData { url: String },
    /// Unsolicited engine-update notification
    RulesUpdated,
    /// One-way scriptlet failure report
    ReportScriptletError { detail: ScriptletErrorDetail },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptletErrorDetail {
    pub scriptlet_name: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayload {
    pub metadata_payload: RuleSet,
}

/// Reply to a gateway request: a payload or a structured error, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<GatewayPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayReply {
    pub fn rules(set: RuleSet) -> Self {
        Self {
            data: Some(GatewayPayload {
                metadata_payload: set,
            }),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    /// Empty acknowledgement for one-way messages.
    pub fn ack() -> Self {
        Self::default()
    }
}

// =============================================================================
// Channel Seam
// =============================================================================

/// The underlying page-to-delivery message channel.
#[async_trait]
pub trait PageChannel: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayReply, GatewayError>;
}

// =============================================================================
// Gateway Client
// =============================================================================

pub struct Gateway<C> {
    channel: C,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<C: PageChannel> Gateway<C> {
    pub fn new(channel: C, config: &DeliveryConfig) -> Self {
        Self {
            channel,
            policy: RetryPolicy::from_config(config),
            timeout: config.request_timeout(),
        }
    }

    /// Request the rule set for a page URL, retrying retryable failures.
    pub async fn request_rules(&self, url: &str) -> Result<RuleSet, GatewayError> {
        let mut attempt: u32 = 1;
        loop {
            match self.attempt_once(url).await {
                Ok(set) => return Ok(set),
                Err(err) => {
                    if err.is_terminal() || self.policy.is_non_retryable(&err.to_string()) {
                        log::warn!("gateway request for {url} aborted: {err}");
                        return Err(err);
                    }
                    if attempt >= self.policy.max_attempts {
                        log::warn!("gateway request for {url} exhausted {attempt} attempts: {err}");
                        return Err(err);
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    log::debug!(
                        "gateway request for {url} attempt {attempt} failed ({err}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fire a one-way scriptlet error report. Outcome is logged, not returned.
    pub async fn report_scriptlet_error(&self, detail: ScriptletErrorDetail) {
        let request = GatewayRequest::ReportScriptletError { detail };
        match tokio::time::timeout(self.timeout, self.channel.send(request)).await {
            Err(_) => log::debug!("scriptlet error report timed out"),
            Ok(Err(err)) => log::debug!("scriptlet error report not delivered: {err}"),
            Ok(Ok(_)) => {}
        }
    }

    async fn attempt_once(&self, url: &str) -> Result<RuleSet, GatewayError> {
        let request = GatewayRequest::GetAdvancedBlockingData {
            url: url.to_string(),
        };
        let reply = tokio::time::timeout(self.timeout, self.channel.send(request))
            .await
            .map_err(|_| GatewayError::Timeout)??;

        if let Some(error) = reply.error {
            return Err(GatewayError::Remote(error));
        }
        match reply.data {
            Some(payload) => Ok(payload.metadata_payload),
            None => Err(GatewayError::Remote("reply carried no data".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = GatewayRequest::GetAdvancedBlockingData {
            url: "https://a.test/".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "getAdvancedBlockingData");
        assert_eq!(value["url"], "https://a.test/");

        let value = serde_json::to_value(GatewayRequest::RulesUpdated).unwrap();
        assert_eq!(value["action"], "rulesUpdated");
    }

    #[test]
    fn test_error_report_wire_shape() {
        let request = GatewayRequest::ReportScriptletError {
            detail: ScriptletErrorDetail {
                scriptlet_name: "remove-attribute".into(),
                error_message: "boom".into(),
                error_stack: None,
                url: "https://a.test/".into(),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["action"], "reportScriptletError");
        assert_eq!(value["detail"]["scriptletName"], "remove-attribute");
        assert!(value["detail"].get("errorStack").is_none());
    }

    #[test]
    fn test_reply_payload_shape() {
        let reply = GatewayReply::rules(RuleSet::default());
        let value = serde_json::to_value(&reply).unwrap();
        assert!(value["data"]["metadataPayload"].get("cssInject").is_some());
        assert!(value.get("error").is_none());
    }
}
