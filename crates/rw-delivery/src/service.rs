//! Delivery-side message dispatch
//!
//! Answers gateway messages on behalf of the coordinator. Every action
//! gets a reply (one-way messages get an empty ack); an unknown or failed
//! action becomes a structured error reply, never a panic, so one page's
//! request can never take down the delivery channel.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::EngineTransport;
use crate::coordinator::Coordinator;
use crate::error::GatewayError;
use crate::gateway::{GatewayReply, GatewayRequest, PageChannel};

pub struct DeliveryService<T: EngineTransport + 'static> {
    coordinator: Arc<Coordinator<T>>,
}

impl<T: EngineTransport + 'static> DeliveryService<T> {
    pub fn new(coordinator: Arc<Coordinator<T>>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator<T>> {
        &self.coordinator
    }

    pub async fn handle(&self, request: GatewayRequest) -> GatewayReply {
        match request {
            GatewayRequest::GetAdvancedBlockingData { url } => {
                match self.coordinator.resolve(&url).await {
                    Ok(set) => GatewayReply::rules((*set).clone()),
                    Err(err) => GatewayReply::failure(err.to_string()),
                }
            }
            GatewayRequest::RulesUpdated => {
                self.coordinator.handle_rules_updated();
                GatewayReply::ack()
            }
            GatewayRequest::ReportScriptletError { detail } => {
                log::warn!(
                    "scriptlet '{}' failed on {}: {}",
                    detail.scriptlet_name,
                    detail.url,
                    detail.error_message
                );
                if let Some(stack) = detail.error_stack {
                    log::debug!("scriptlet '{}' stack: {stack}", detail.scriptlet_name);
                }
                GatewayReply::ack()
            }
        }
    }

    /// Dispatch a raw JSON message. A malformed message gets an error
    /// reply in the gateway's own shape.
    pub async fn handle_json(&self, message: &str) -> GatewayReply {
        match serde_json::from_str::<GatewayRequest>(message) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                log::warn!("unparseable gateway message: {err}");
                GatewayReply::failure(format!("JSON parse error: {err}"))
            }
        }
    }
}

/// In-process channel: a gateway client wired straight into a service.
pub struct LocalChannel<T: EngineTransport + 'static> {
    service: Arc<DeliveryService<T>>,
}

impl<T: EngineTransport + 'static> LocalChannel<T> {
    pub fn new(service: Arc<DeliveryService<T>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<T: EngineTransport + 'static> PageChannel for LocalChannel<T> {
    async fn send(&self, request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        Ok(self.service.handle(request).await)
    }
}
