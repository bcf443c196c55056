//! RuleWire Page Runtime
//!
//! Everything that runs in the page process once a rule set has been
//! delivered: the DOM model the rules are applied to, the applier with
//! its per-category reporting and idempotence cache, the extended-CSS
//! seam, the scriptlet runtime and the throttled mutation observer.
//!
//! # Failure policy
//!
//! A single failing rule unit is caught and recorded per unit; it never
//! aborts sibling units, and nothing in this crate panics through to the
//! host page. Failures degrade to "no rules applied for this category".
//!
//! # Modules
//!
//! - `dom`: arena-based document model with shadow roots and stylesheet
//!   injection bookkeeping
//! - `extended`: extended-CSS engine seam and the default hiding engine
//! - `applier`: per-category rule application and reporting
//! - `scriptlets`: name-keyed scriptlet registry, builtins and helpers
//! - `observer`: throttled DOM-mutation observer state machine

pub mod applier;
pub mod dom;
pub mod extended;
pub mod observer;
pub mod scriptlets;

pub use applier::RuleApplier;
pub use dom::{Document, NodeId, Selector, SimScriptHost, StylesheetId};
pub use extended::{DomHidingEngine, ExtendedCssEngine, HIDDEN_ATTR};
pub use observer::{MutationObserver, ObserverState};
pub use scriptlets::{ScriptletError, ScriptletErrorReport, ScriptletRegistry};
