//! Scriptlet Runtime
//!
//! A name-keyed registry of small DOM-mutation routines, invoked by the
//! applier with a positional string argument list. Registration is
//! validated (non-empty, unique names); invoking an unregistered name is
//! a warn-and-skip outcome, never fatal. Handler failures, including
//! panics, are caught and surfaced as error reports, not thrown back at
//! the caller.

pub mod helpers;

mod builtins;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rw_core::ScriptletInvocation;

use crate::dom::Document;
use crate::observer::MutationObserver;

/// A registered scriptlet routine.
pub type ScriptletFn = fn(&mut Document, &[String], bool) -> Result<(), ScriptletError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptletError {
    #[error("unknown scriptlet: {0}")]
    Unknown(String),
    #[error("scriptlet name must not be empty")]
    EmptyName,
    #[error("scriptlet '{0}' already registered")]
    Duplicate(String),
    #[error("invalid scriptlet arguments: {0}")]
    InvalidArgs(String),
    #[error("scriptlet failed: {0}")]
    Failed(String),
}

/// Out-of-band failure report, forwarded to the delivery process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptletErrorReport {
    pub scriptlet_name: String,
    pub error_message: String,
    pub url: String,
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Clone)]
pub struct ScriptletRegistry {
    handlers: HashMap<String, ScriptletFn>,
}

impl Default for ScriptletRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ScriptletRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the builtin scriptlets pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        // Builtin names are unique by construction
        let _ = registry.register("remove-node-in-shadow-dom", builtins::remove_node_in_shadow_dom);
        let _ = registry.register("remove-attribute", builtins::remove_attribute);
        registry
    }

    pub fn register(&mut self, name: &str, handler: ScriptletFn) -> Result<(), ScriptletError> {
        if name.trim().is_empty() {
            return Err(ScriptletError::EmptyName);
        }
        if self.handlers.contains_key(name) {
            return Err(ScriptletError::Duplicate(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Invoke a scriptlet by name. Handler panics are contained and
    /// reported as [`ScriptletError::Failed`].
    pub fn invoke(
        &self,
        doc: &mut Document,
        name: &str,
        args: &[String],
        verbose: bool,
    ) -> Result<(), ScriptletError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ScriptletError::Unknown(name.to_string()))?;
        if verbose {
            log::debug!("scriptlet '{name}' invoked with args {args:?}");
        }
        match catch_unwind(AssertUnwindSafe(|| handler(doc, args, verbose))) {
            Ok(result) => result,
            Err(panic) => Err(ScriptletError::Failed(describe_panic(panic))),
        }
    }
}

fn describe_panic(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

// =============================================================================
// Level-triggered invocation
// =============================================================================

/// Run a scriptlet once against the current DOM, then keep re-running it
/// on observed mutations. Every pass re-scans current matches rather than
/// diffing, so dynamically inserted nodes are processed too.
pub fn watch_scriptlet(
    doc: &mut Document,
    registry: &ScriptletRegistry,
    invocation: &ScriptletInvocation,
    verbose: bool,
) -> Result<MutationObserver, ScriptletError> {
    registry.invoke(doc, &invocation.name, &invocation.args, verbose)?;

    let registry = registry.clone();
    let invocation = invocation.clone();
    let mut observer = MutationObserver::new(Box::new(move |doc: &mut Document| {
        if let Err(err) = registry.invoke(doc, &invocation.name, &invocation.args, verbose) {
            log::warn!("scriptlet '{}' re-run failed: {err}", invocation.name);
        }
    }));
    observer.observe(doc);
    Ok(observer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Document, _: &[String], _: bool) -> Result<(), ScriptletError> {
        Ok(())
    }

    fn panicky(_: &mut Document, _: &[String], _: bool) -> Result<(), ScriptletError> {
        panic!("scriptlet bug");
    }

    #[test]
    fn test_registration_validation() {
        let mut registry = ScriptletRegistry::empty();
        assert!(registry.register("x", noop).is_ok());
        assert!(matches!(
            registry.register("x", noop),
            Err(ScriptletError::Duplicate(_))
        ));
        assert!(matches!(
            registry.register("  ", noop),
            Err(ScriptletError::EmptyName)
        ));
    }

    #[test]
    fn test_unknown_name_is_reported_not_fatal() {
        let registry = ScriptletRegistry::empty();
        let mut doc = Document::new();
        let err = registry.invoke(&mut doc, "nope", &[], false).unwrap_err();
        assert!(matches!(err, ScriptletError::Unknown(_)));
    }

    #[test]
    fn test_panic_contained() {
        let mut registry = ScriptletRegistry::empty();
        registry.register("boom", panicky).unwrap();
        let mut doc = Document::new();
        let err = registry.invoke(&mut doc, "boom", &[], false).unwrap_err();
        match err {
            ScriptletError::Failed(message) => assert!(message.contains("scriptlet bug")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ScriptletRegistry::with_builtins();
        assert!(registry.contains("remove-node-in-shadow-dom"));
        assert!(registry.contains("remove-attribute"));
    }
}
