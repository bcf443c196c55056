//! RuleWire Core Library
//!
//! This crate provides the shared foundation for the RuleWire rule-delivery
//! pipeline: the rule-set data model, the bounded and pinned rule caches,
//! URL/hostname utilities and rule-group fingerprinting.
//!
//! # Architecture
//!
//! A page requests its filtering rules through the messaging gateway; the
//! delivery process answers from its caches or by querying the privileged
//! rule engine. Everything that both sides of that pipeline need to agree
//! on lives here, with no async machinery and no wire transport.
//!
//! # Modules
//!
//! - `types`: RuleSet, scriptlet invocations, application reports
//! - `url`: fast scheme/host extraction and the page-hostname policy
//! - `hash`: stable rule-group fingerprints (xxHash64)
//! - `cache`: bounded TTL+LRU rule cache and the pinned hostname cache
//! - `config`: delivery-process configuration

pub mod cache;
pub mod config;
pub mod hash;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use cache::{PinnedCache, RuleCache};
pub use config::DeliveryConfig;
pub use hash::{fingerprint_group, fingerprint_ruleset};
pub use types::{ApplicationReport, CategoryMask, CategoryStats, RuleSet, RuleSetSource, ScriptletInvocation};
pub use url::page_hostname;
