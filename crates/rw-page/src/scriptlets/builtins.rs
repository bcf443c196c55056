//! Builtin scriptlets
//!
//! Each routine is level-triggered: it scans the current DOM state on
//! every invocation, so re-running it after a mutation picks up
//! dynamically inserted nodes.

use crate::dom::{Document, Selector};

use super::helpers::{query_shadow, shadow_hosts};
use super::ScriptletError;

fn required_selector(args: &[String], index: usize) -> Result<Selector, ScriptletError> {
    let raw = args
        .get(index)
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ScriptletError::InvalidArgs(format!("argument {index} must be a selector")))?;
    Selector::parse(raw)
        .ok_or_else(|| ScriptletError::InvalidArgs(format!("unsupported selector: {raw}")))
}

/// `remove-node-in-shadow-dom(selector, host-selector?)`
///
/// Removes every element matching the selector, in the light DOM and in
/// shadow trees at any depth. When a host selector is given, only shadow
/// trees under matching hosts are descended.
pub(super) fn remove_node_in_shadow_dom(
    doc: &mut Document,
    args: &[String],
    verbose: bool,
) -> Result<(), ScriptletError> {
    let selector = required_selector(args, 0)?;
    let host_filter = match args.get(1).map(String::as_str).filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(Selector::parse(raw).ok_or_else(|| {
            ScriptletError::InvalidArgs(format!("unsupported host selector: {raw}"))
        })?),
        None => None,
    };
    let mut removed = 0usize;

    for node in doc.query_selector_all(&selector, doc.root()) {
        doc.remove(node);
        removed += 1;
    }

    let mut hosts = shadow_hosts(doc, doc.root());
    if let Some(host_selector) = &host_filter {
        hosts.retain(|&h| doc.matches(h, host_selector));
    }
    while !hosts.is_empty() {
        let result = query_shadow(doc, &selector, &hosts);
        for node in result.matches {
            doc.remove(node);
            removed += 1;
        }
        hosts = result.deeper_hosts;
    }

    if verbose {
        log::debug!("remove-node-in-shadow-dom removed {removed} nodes");
    }
    Ok(())
}

/// `remove-attribute(attribute, selector?)`
///
/// Strips an attribute from every matching element (all elements when no
/// selector is given), shadow trees included.
pub(super) fn remove_attribute(
    doc: &mut Document,
    args: &[String],
    verbose: bool,
) -> Result<(), ScriptletError> {
    let attribute = args
        .get(0)
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ScriptletError::InvalidArgs("attribute name required".into()))?;

    let selector = match args.get(1).map(String::as_str).filter(|s| !s.trim().is_empty()) {
        Some(raw) => Selector::parse(raw)
            .ok_or_else(|| ScriptletError::InvalidArgs(format!("unsupported selector: {raw}")))?,
        None => Selector::parse("*").ok_or_else(|| {
            ScriptletError::InvalidArgs("universal selector unavailable".into())
        })?,
    };

    let mut stripped = 0usize;
    let mut targets = doc.query_selector_all(&selector, doc.root());

    let mut hosts = shadow_hosts(doc, doc.root());
    while !hosts.is_empty() {
        let result = query_shadow(doc, &selector, &hosts);
        targets.extend(result.matches);
        hosts = result.deeper_hosts;
    }

    targets.sort_unstable();
    targets.dedup();
    for node in targets {
        if doc.remove_attribute(node, attribute) {
            stripped += 1;
        }
    }

    if verbose {
        log::debug!("remove-attribute stripped '{attribute}' from {stripped} nodes");
    }
    Ok(())
}
