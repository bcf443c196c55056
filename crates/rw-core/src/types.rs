//! Core type definitions for RuleWire
//!
//! `RuleSet` is the unit of delivery: everything one page needs to filter
//! itself. Its JSON shape is wire-compatible with the page script, so the
//! wire-facing structs carry serde renames and `ts-rs` exports.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Rule Set
// =============================================================================

/// Where a delivered rule set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleSetSource {
    /// Served from the bounded URL-keyed cache
    Cache,
    /// Served from the pinned hostname cache
    PinnedCache,
    /// Fetched from the privileged engine for this request
    #[default]
    FreshFetch,
    /// URL was not eligible for filtering; empty set returned
    Skipped,
}

impl RuleSetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::PinnedCache => "pinned-cache",
            Self::FreshFetch => "fresh-fetch",
            Self::Skipped => "skipped",
        }
    }
}

/// A named scriptlet invocation: a small DOM-mutation routine plus its
/// positional string arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScriptletInvocation {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// The complete set of filtering instructions for one page.
///
/// All four sequences are always present, defaulting to empty; never
/// absent/null on the wire. A rule set is immutable once constructed and
/// discarded when the page unloads.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RuleSet {
    /// Plain CSS rules, injected as one stylesheet
    #[serde(default)]
    pub css_inject: Vec<String>,
    /// Extended-CSS rules, delegated to the selector-matching library
    #[serde(default)]
    pub css_extended: Vec<String>,
    /// Script source blocks, injected as one guarded block
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Named scriptlet invocations
    #[serde(default)]
    pub scriptlets: Vec<ScriptletInvocation>,
    /// Creation time, unix milliseconds (0 when decoded from the wire)
    #[serde(skip)]
    #[ts(skip)]
    pub created_at: u64,
    #[serde(skip)]
    #[ts(skip)]
    pub source: RuleSetSource,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            css_inject: Vec::new(),
            css_extended: Vec::new(),
            scripts: Vec::new(),
            scriptlets: Vec::new(),
            created_at: unix_millis_now(),
            source: RuleSetSource::FreshFetch,
        }
    }
}

fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RuleSet {
    /// An empty rule set tagged with the given source.
    pub fn empty(source: RuleSetSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    /// The empty set returned for URLs that are not eligible for filtering.
    pub fn skipped() -> Self {
        Self::empty(RuleSetSource::Skipped)
    }

    /// Decode the wire JSON shape. Missing sequence fields decode as empty.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        let mut set: RuleSet = serde_json::from_str(payload)?;
        set.created_at = unix_millis_now();
        Ok(set)
    }

    /// Same rules, different source tag. Used when a cache hit is handed out.
    pub fn with_source(&self, source: RuleSetSource) -> Self {
        let mut set = self.clone();
        set.source = source;
        set
    }

    pub fn is_empty(&self) -> bool {
        self.css_inject.is_empty()
            && self.css_extended.is_empty()
            && self.scripts.is_empty()
            && self.scriptlets.is_empty()
    }

    /// Total rule count across all categories.
    pub fn rule_count(&self) -> usize {
        self.css_inject.len() + self.css_extended.len() + self.scripts.len() + self.scriptlets.len()
    }
}

// =============================================================================
// Category Mask
// =============================================================================

bitflags::bitflags! {
    /// Which rule categories an application pass covers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CategoryMask: u8 {
        const CSS_INJECT = 1 << 0;
        const CSS_EXTENDED = 1 << 1;
        const SCRIPTS = 1 << 2;
        const SCRIPTLETS = 1 << 3;
        /// All categories
        const ALL = 0x0F;
    }
}

// =============================================================================
// Application Report
// =============================================================================

/// Attempted/succeeded counters for one rule category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub attempted: u32,
    pub succeeded: u32,
}

impl CategoryStats {
    pub fn record(&mut self, attempted: u32, succeeded: u32) {
        self.attempted += attempted;
        self.succeeded += succeeded;
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded == self.attempted
    }
}

/// Per-category outcome of one page's rule-application pass.
///
/// Mutated only by the applier during the pass; read-only thereafter.
/// Used for logging and telemetry, never to gate behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationReport {
    pub css_inject: CategoryStats,
    pub css_extended: CategoryStats,
    pub scripts: CategoryStats,
    pub scriptlets: CategoryStats,
}

impl ApplicationReport {
    pub fn total_attempted(&self) -> u32 {
        self.css_inject.attempted
            + self.css_extended.attempted
            + self.scripts.attempted
            + self.scriptlets.attempted
    }

    pub fn total_succeeded(&self) -> u32 {
        self.css_inject.succeeded
            + self.css_extended.succeeded
            + self.scripts.succeeded
            + self.scriptlets.succeeded
    }

    /// Per-category (label, stats) view for log lines.
    pub fn categories(&self) -> [(&'static str, CategoryStats); 4] {
        [
            ("cssInject", self.css_inject),
            ("cssExtended", self.css_extended),
            ("scripts", self.scripts),
            ("scriptlets", self.scriptlets),
        ]
    }
}
