//! Shared helpers for scriptlet routines
//!
//! Shadow-DOM traversal works one level at a time: a query pass returns
//! the matches reachable from the current host set plus the hosts
//! discovered one level deeper, so callers re-descend iteratively
//! instead of recursing.

use serde_json::Value;

use crate::dom::{Document, NodeId, Selector};

/// Light-DOM descendants of `scope` that expose a shadow root.
pub fn shadow_hosts(doc: &Document, scope: NodeId) -> Vec<NodeId> {
    doc.descendants(scope)
        .into_iter()
        .filter(|&n| doc.shadow_root(n).is_some())
        .collect()
}

/// One level of a shadow-DOM query.
pub struct ShadowQuery {
    /// Selector matches in each host's light DOM and inside its shadow root
    pub matches: Vec<NodeId>,
    /// Shadow hosts discovered one level deeper, for iterative re-descent
    pub deeper_hosts: Vec<NodeId>,
}

pub fn query_shadow(doc: &Document, selector: &Selector, hosts: &[NodeId]) -> ShadowQuery {
    let mut matches = Vec::new();
    let mut deeper_hosts = Vec::new();

    for &host in hosts {
        matches.extend(doc.query_selector_all(selector, host));
        if let Some(shadow) = doc.shadow_root(host) {
            matches.extend(doc.query_selector_all(selector, shadow));
            deeper_hosts.extend(shadow_hosts(doc, shadow));
        }
    }

    matches.sort_unstable();
    matches.dedup();
    ShadowQuery {
        matches,
        deeper_hosts,
    }
}

/// Collapse arbitrarily nested argument sequences into one flat ordered
/// list, preserving relative order. Strings stay as-is; other scalars are
/// rendered as their JSON text.
pub fn flatten(values: &[Value]) -> Vec<String> {
    let mut out = Vec::new();
    for value in values {
        flatten_into(value, &mut out);
    }
    out
}

fn flatten_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Value::String(s) => out.push(s.clone()),
        Value::Null => {}
        other => out.push(other.to_string()),
    }
}
