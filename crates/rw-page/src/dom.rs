//! Arena-based document model
//!
//! The applier and the scriptlet runtime need a DOM they can query and
//! mutate: elements with attributes, shadow roots, injected stylesheets
//! with read-back rule counts, an injected-script ledger and a
//! page-global key store for the script success guard. Nodes live in a
//! flat arena and are addressed by `NodeId` handles; traversal follows
//! child links, and shadow subtrees are reachable only through their
//! host's shadow pointer, exactly like light-DOM queries in a browser.
//!
//! Every mutating operation bumps a mutation counter, which is what the
//! throttled observer watches.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StylesheetId(usize);

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    shadow_root: Option<NodeId>,
}

#[derive(Debug)]
pub struct Stylesheet {
    pub css: String,
    pub rule_count: usize,
}

/// Synthetic tag for shadow-root container nodes.
const SHADOW_ROOT_TAG: &str = "#shadow-root";

pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    stylesheets: Vec<Stylesheet>,
    scripts: Vec<String>,
    globals: HashMap<String, String>,
    mutations: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            stylesheets: Vec::new(),
            scripts: Vec::new(),
            globals: HashMap::new(),
            mutations: 0,
        };
        doc.root = doc.alloc("html");
        doc
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            ..Node::default()
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    // =========================================================================
    // Tree construction and mutation
    // =========================================================================

    /// Create a detached element. Attach it with [`Document::append_child`].
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(tag)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.mutations += 1;
    }

    /// Unlink a node (and implicitly its subtree) from its parent.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
            self.mutations += 1;
        }
    }

    /// Attach a shadow root to a host element, returning its container.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        if let Some(existing) = self.nodes[host.0].shadow_root {
            return existing;
        }
        let container = self.alloc(SHADOW_ROOT_TAG);
        self.nodes[host.0].shadow_root = Some(container);
        self.mutations += 1;
        container
    }

    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.nodes[host.0].shadow_root
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node.0]
            .attributes
            .insert(name.to_ascii_lowercase(), value.to_string());
        self.mutations += 1;
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0]
            .attributes
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> bool {
        let removed = self.nodes[node.0]
            .attributes
            .remove(&name.to_ascii_lowercase())
            .is_some();
        if removed {
            self.mutations += 1;
        }
        removed
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = Some(text.to_string());
        self.mutations += 1;
    }

    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    // =========================================================================
    // Traversal and queries
    // =========================================================================

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Light-DOM descendants of `scope` in document order, excluding
    /// `scope` itself. Shadow subtrees are not descended into.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[scope.0].children.iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            for &child in self.nodes[node.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        let data = &self.nodes[node.0];
        if data.tag == SHADOW_ROOT_TAG {
            return false;
        }
        if let Some(tag) = &selector.tag {
            if tag != "*" && *tag != data.tag {
                return false;
            }
        }
        if let Some(id) = &selector.id {
            if data.attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !selector.classes.is_empty() {
            let class_attr = data.attributes.get("class").map(String::as_str).unwrap_or("");
            let classes: Vec<&str> = class_attr.split_ascii_whitespace().collect();
            if !selector.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        for attr in &selector.attrs {
            match data.attributes.get(&attr.name) {
                None => return false,
                Some(value) => {
                    if let Some(expected) = &attr.value {
                        if value != expected {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// All light-DOM descendants of `scope` matching the selector.
    pub fn query_selector_all(&self, selector: &Selector, scope: NodeId) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| self.matches(n, selector))
            .collect()
    }

    // =========================================================================
    // Stylesheets
    // =========================================================================

    /// Inject a stylesheet and parse its rule count for verification.
    pub fn inject_stylesheet(&mut self, css: &str) -> StylesheetId {
        let id = StylesheetId(self.stylesheets.len());
        self.stylesheets.push(Stylesheet {
            css: css.to_string(),
            rule_count: count_css_rules(css),
        });
        self.mutations += 1;
        id
    }

    pub fn stylesheet_count(&self) -> usize {
        self.stylesheets.len()
    }

    pub fn stylesheet_rule_count(&self, id: StylesheetId) -> Option<usize> {
        self.stylesheets.get(id.0).map(|s| s.rule_count)
    }

    // =========================================================================
    // Scripts and page globals
    // =========================================================================

    pub fn record_script(&mut self, source: &str) {
        self.scripts.push(source.to_string());
        self.mutations += 1;
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    pub fn set_global(&mut self, key: &str, value: &str) {
        self.globals.insert(key.to_string(), value.to_string());
    }

    /// Read back and delete a page global.
    pub fn take_global(&mut self, key: &str) -> Option<String> {
        self.globals.remove(key)
    }
}

/// Count top-level rule blocks in a CSS string.
fn count_css_rules(css: &str) -> usize {
    let mut depth = 0usize;
    let mut rules = 0usize;
    for ch in css.chars() {
        match ch {
            '{' => {
                if depth == 0 {
                    rules += 1;
                }
                depth += 1;
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    rules
}

// =============================================================================
// Script Host Seam
// =============================================================================

/// The JavaScript-engine seam: executes an injected script block against
/// the page. Implementations must honor the success-guard contract: a
/// block that runs to completion sets the `window["..."]` guard key the
/// applier embedded in it.
pub trait ScriptHost {
    fn execute(&mut self, doc: &mut Document, source: &str) -> Result<(), String>;
}

/// Marker prefix for the applier's success-guard page globals.
pub const GUARD_PREFIX: &str = "__rw_applied_";

/// Host that simulates successful evaluation: records the source and
/// sets the embedded guard global, exercising the read-back path.
#[derive(Debug, Default)]
pub struct SimScriptHost;

impl ScriptHost for SimScriptHost {
    fn execute(&mut self, doc: &mut Document, source: &str) -> Result<(), String> {
        doc.record_script(source);
        if let Some(key) = extract_guard_key(source) {
            let key = key.to_string();
            doc.set_global(&key, "ok");
        }
        Ok(())
    }
}

/// Pull the first guard key out of a wrapped script block.
pub fn extract_guard_key(source: &str) -> Option<&str> {
    let start = source.find(GUARD_PREFIX)?;
    let rest = &source[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

// =============================================================================
// Selector
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrFilter {
    name: String,
    value: Option<String>,
}

/// A compound simple selector: `tag#id.class[attr="value"]`.
/// Combinators are out of scope; the extended-CSS engine owns anything
/// fancier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrFilter>,
}

impl Selector {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let mut selector = Selector {
            tag: None,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
        };

        let bytes = input.as_bytes();
        let mut pos = 0usize;

        // Leading tag (or universal *)
        if bytes[0] != b'#' && bytes[0] != b'.' && bytes[0] != b'[' {
            let end = input
                .find(|c| c == '#' || c == '.' || c == '[')
                .unwrap_or(input.len());
            let tag = &input[..end];
            if tag.contains(char::is_whitespace) {
                return None; // combinators unsupported
            }
            selector.tag = Some(tag.to_ascii_lowercase());
            pos = end;
        }

        while pos < input.len() {
            match bytes[pos] {
                b'#' => {
                    let rest = &input[pos + 1..];
                    let end = rest
                        .find(|c| c == '#' || c == '.' || c == '[')
                        .unwrap_or(rest.len());
                    if end == 0 {
                        return None;
                    }
                    selector.id = Some(rest[..end].to_string());
                    pos += 1 + end;
                }
                b'.' => {
                    let rest = &input[pos + 1..];
                    let end = rest
                        .find(|c| c == '#' || c == '.' || c == '[')
                        .unwrap_or(rest.len());
                    if end == 0 {
                        return None;
                    }
                    selector.classes.push(rest[..end].to_string());
                    pos += 1 + end;
                }
                b'[' => {
                    let rest = &input[pos + 1..];
                    let end = rest.find(']')?;
                    let body = &rest[..end];
                    let filter = match body.split_once('=') {
                        Some((name, value)) => AttrFilter {
                            name: name.trim().to_ascii_lowercase(),
                            value: Some(value.trim().trim_matches('"').trim_matches('\'').to_string()),
                        },
                        None => AttrFilter {
                            name: body.trim().to_ascii_lowercase(),
                            value: None,
                        },
                    };
                    if filter.name.is_empty() {
                        return None;
                    }
                    selector.attrs.push(filter);
                    pos += 1 + end + 1;
                }
                _ => return None,
            }
        }

        Some(selector)
    }
}
