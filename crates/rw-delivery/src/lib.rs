//! RuleWire Delivery Process
//!
//! Everything that runs in the privileged-adjacent delivery process:
//!
//! - `bridge`: request/response protocol to the privileged rule engine,
//!   including chunked payload reassembly
//! - `coordinator`: caching, request deduplication and retry driving
//! - `preload`: pinned-cache warmup at process start
//! - `gateway`: the per-page request channel (client side) and wire types
//! - `service`: delivery-side dispatch of gateway messages
//! - `static_engine`: in-process engine transport for tests and tooling
//!
//! Concurrency is cooperative: one event loop, many in-flight operations.
//! Per cache key, the coordinator guarantees at most one outstanding
//! engine call; unrelated keys proceed concurrently up to the configured
//! parallel-fetch limit.

pub mod bridge;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod preload;
pub mod retry;
pub mod service;
pub mod static_engine;

pub use bridge::{EngineBridge, EngineReply, EngineRequest, EngineTransport};
pub use coordinator::Coordinator;
pub use error::{EngineError, FetchError, GatewayError};
pub use gateway::{Gateway, GatewayPayload, GatewayReply, GatewayRequest, PageChannel, ScriptletErrorDetail};
pub use preload::Preloader;
pub use retry::RetryPolicy;
pub use service::{DeliveryService, LocalChannel};
pub use static_engine::StaticEngine;
