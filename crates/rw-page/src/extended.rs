//! Extended-CSS engine seam
//!
//! Extended-CSS rules (`:has`, `:contains`, procedural hiding) are
//! matched by an external library; the applier only needs to hand it a
//! rule and learn how many live elements matched. The default engine
//! understands plain compound selectors and hides matches by attribute,
//! which is enough for tests and tooling.

use crate::dom::{Document, Selector};
use crate::scriptlets::helpers::{query_shadow, shadow_hosts};

/// Attribute set on elements hidden by the default engine.
pub const HIDDEN_ATTR: &str = "data-rw-hidden";

pub trait ExtendedCssEngine {
    /// Apply one hiding rule (`selector { declarations }`).
    /// Returns the number of elements that matched.
    fn apply(&mut self, doc: &mut Document, rule: &str) -> usize;
}

/// Default engine: parses the selector part of the rule, hides light-DOM
/// and shadow-DOM matches by setting [`HIDDEN_ATTR`].
#[derive(Debug, Default)]
pub struct DomHidingEngine;

impl ExtendedCssEngine for DomHidingEngine {
    fn apply(&mut self, doc: &mut Document, rule: &str) -> usize {
        let selector_part = rule.split('{').next().unwrap_or("").trim();
        let Some(selector) = Selector::parse(selector_part) else {
            log::warn!("extended-css engine could not parse selector: {selector_part}");
            return 0;
        };

        let mut matched = doc.query_selector_all(&selector, doc.root());

        // Descend shadow trees level by level
        let mut hosts = shadow_hosts(doc, doc.root());
        while !hosts.is_empty() {
            let result = query_shadow(doc, &selector, &hosts);
            matched.extend(result.matches);
            hosts = result.deeper_hosts;
        }

        matched.sort_unstable();
        matched.dedup();
        for &node in &matched {
            doc.set_attribute(node, HIDDEN_ATTR, "true");
        }
        matched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hides_matches() {
        let mut doc = Document::new();
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body);
        let ad = doc.create_element("div");
        doc.set_attribute(ad, "class", "banner");
        doc.append_child(body, ad);

        let mut engine = DomHidingEngine;
        let count = engine.apply(&mut doc, ".banner { display: none !important; }");
        assert_eq!(count, 1);
        assert_eq!(doc.get_attribute(ad, HIDDEN_ATTR), Some("true"));
    }

    #[test]
    fn test_no_match_returns_zero() {
        let mut doc = Document::new();
        let mut engine = DomHidingEngine;
        assert_eq!(engine.apply(&mut doc, ".missing { display: none; }"), 0);
    }

    #[test]
    fn test_reaches_into_shadow() {
        let mut doc = Document::new();
        let host = doc.create_element("widget");
        doc.append_child(doc.root(), host);
        let shadow = doc.attach_shadow(host);
        let ad = doc.create_element("div");
        doc.set_attribute(ad, "class", "promo");
        doc.append_child(shadow, ad);

        let mut engine = DomHidingEngine;
        assert_eq!(engine.apply(&mut doc, ".promo"), 1);
        assert_eq!(doc.get_attribute(ad, HIDDEN_ATTR), Some("true"));
    }
}
