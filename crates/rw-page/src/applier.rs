//! Page Rule Applier
//!
//! Takes a delivered rule set and applies it to the document in four
//! category passes. Each pass is independently fallible: a failure in one
//! category is counted and logged but never blocks the others. A content
//! fingerprint per applied group makes re-application idempotent, so the
//! applier can be re-driven when late rules arrive or the page re-signals
//! readiness without doubling stylesheets or re-running scripts.

use std::collections::HashSet;

use rw_core::{fingerprint_group, ApplicationReport, CategoryMask, RuleSet, ScriptletInvocation};

use crate::dom::{Document, ScriptHost, GUARD_PREFIX};
use crate::extended::ExtendedCssEngine;
use crate::observer::MutationObserver;
use crate::scriptlets::{watch_scriptlet, ScriptletError, ScriptletErrorReport, ScriptletRegistry};

pub struct RuleApplier {
    page_url: String,
    verbose: bool,
    registry: ScriptletRegistry,
    extended_engine: Box<dyn ExtendedCssEngine>,
    script_host: Box<dyn ScriptHost>,
    /// Fingerprints of rule groups already applied to this page
    applied_groups: HashSet<u64>,
    observers: Vec<MutationObserver>,
    error_reports: Vec<ScriptletErrorReport>,
}

impl RuleApplier {
    pub fn new(
        page_url: &str,
        registry: ScriptletRegistry,
        extended_engine: Box<dyn ExtendedCssEngine>,
        script_host: Box<dyn ScriptHost>,
        verbose: bool,
    ) -> Self {
        Self {
            page_url: page_url.to_string(),
            verbose,
            registry,
            extended_engine,
            script_host,
            applied_groups: HashSet::new(),
            observers: Vec::new(),
            error_reports: Vec::new(),
        }
    }

    /// Apply every category of the rule set. Equivalent to
    /// [`RuleApplier::apply`] with [`CategoryMask::ALL`].
    pub fn apply_all(&mut self, doc: &mut Document, rules: &RuleSet) -> ApplicationReport {
        self.apply(doc, rules, CategoryMask::ALL)
    }

    /// Apply the selected categories, returning per-category counters.
    /// Groups already applied to this page are skipped and counted as
    /// succeeded, so callers may re-drive the applier freely.
    pub fn apply(
        &mut self,
        doc: &mut Document,
        rules: &RuleSet,
        mask: CategoryMask,
    ) -> ApplicationReport {
        let mut report = ApplicationReport::default();

        if mask.contains(CategoryMask::CSS_INJECT) {
            self.apply_css_inject(doc, &rules.css_inject, &mut report);
        }
        if mask.contains(CategoryMask::CSS_EXTENDED) {
            self.apply_css_extended(doc, &rules.css_extended, &mut report);
        }
        if mask.contains(CategoryMask::SCRIPTS) {
            self.apply_scripts(doc, &rules.scripts, &mut report);
        }
        if mask.contains(CategoryMask::SCRIPTLETS) {
            self.apply_scriptlets(doc, &rules.scriptlets, &mut report);
        }

        for (label, stats) in report.categories() {
            if stats.attempted > 0 {
                log::info!(
                    "{}: {} applied {}/{} for {}",
                    rules.source.as_str(),
                    label,
                    stats.succeeded,
                    stats.attempted,
                    self.page_url
                );
            }
        }
        report
    }

    /// Out-of-band scriptlet failures collected so far.
    pub fn error_reports(&self) -> &[ScriptletErrorReport] {
        &self.error_reports
    }

    pub fn take_error_reports(&mut self) -> Vec<ScriptletErrorReport> {
        std::mem::take(&mut self.error_reports)
    }

    /// Drive the mutation observers attached by scriptlet passes.
    pub fn tick_observers(&mut self, doc: &mut Document, now: std::time::Instant) {
        for observer in &mut self.observers {
            observer.tick(doc, now);
        }
    }

    /// Detach all observers (page teardown).
    pub fn detach(&mut self) {
        for observer in &mut self.observers {
            observer.detach();
        }
        self.observers.clear();
    }

    fn mark_applied(&mut self, fingerprint: u64) -> bool {
        self.applied_groups.insert(fingerprint)
    }

    // =========================================================================
    // Category passes
    // =========================================================================

    /// Plain CSS: joined into one stylesheet, verified by rule count.
    fn apply_css_inject(
        &mut self,
        doc: &mut Document,
        rules: &[String],
        report: &mut ApplicationReport,
    ) {
        if rules.is_empty() {
            return;
        }
        let attempted = rules.len() as u32;
        let fingerprint = fingerprint_group("cssInject", rules);
        if !self.mark_applied(fingerprint) {
            report.css_inject.record(attempted, attempted);
            return;
        }

        let css = rules.join("\n");
        let id = doc.inject_stylesheet(&css);
        let parsed = doc.stylesheet_rule_count(id).unwrap_or(0) as u32;
        let succeeded = parsed.min(attempted);
        if succeeded < attempted {
            log::warn!(
                "stylesheet parsed {succeeded}/{attempted} rules for {}",
                self.page_url
            );
        }
        report.css_inject.record(attempted, succeeded);
    }

    /// Extended CSS: each rule handed to the engine individually. Blank
    /// lines and comment entries are dropped up front; a bare selector is
    /// normalized into a hiding rule.
    fn apply_css_extended(
        &mut self,
        doc: &mut Document,
        rules: &[String],
        report: &mut ApplicationReport,
    ) {
        let usable: Vec<String> = rules
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty() && !r.starts_with('!') && !r.starts_with("/*"))
            .map(|r| {
                if r.contains('{') {
                    r.to_string()
                } else {
                    format!("{r} {{ display: none !important; }}")
                }
            })
            .collect();
        if usable.is_empty() {
            return;
        }

        let attempted = usable.len() as u32;
        let fingerprint = fingerprint_group("cssExtended", &usable);
        if !self.mark_applied(fingerprint) {
            report.css_extended.record(attempted, attempted);
            return;
        }

        let mut succeeded = 0u32;
        for rule in &usable {
            if self.extended_engine.apply(doc, rule) > 0 {
                succeeded += 1;
            } else if self.verbose {
                log::debug!("extended rule matched nothing: {rule}");
            }
        }
        report.css_extended.record(attempted, succeeded);
    }

    /// Scripts: joined into one block wrapped in try/catch with a
    /// fingerprint-derived success guard, then read back from the page.
    fn apply_scripts(
        &mut self,
        doc: &mut Document,
        scripts: &[String],
        report: &mut ApplicationReport,
    ) {
        if scripts.is_empty() {
            return;
        }
        let attempted = scripts.len() as u32;
        let fingerprint = fingerprint_group("scripts", scripts);
        if !self.mark_applied(fingerprint) {
            report.scripts.record(attempted, attempted);
            return;
        }

        let guard_key = format!("{GUARD_PREFIX}{fingerprint:016x}");
        let body = scripts.join("\n");
        let wrapped = format!(
            "try {{\n{body}\nwindow[\"{guard_key}\"] = \"ok\";\n}} catch (e) {{ console.error(e); }}"
        );

        let succeeded = match self.script_host.execute(doc, &wrapped) {
            Ok(()) => match doc.take_global(&guard_key).as_deref() {
                Some("ok") => attempted,
                _ => {
                    log::warn!("script block ran but guard unset for {}", self.page_url);
                    0
                }
            },
            Err(err) => {
                log::warn!("script injection failed for {}: {err}", self.page_url);
                0
            }
        };
        report.scripts.record(attempted, succeeded);
    }

    /// Scriptlets: each invocation runs once, then keeps watching the
    /// document for mutations. Unknown names are skipped with a warning;
    /// failures become out-of-band error reports.
    fn apply_scriptlets(
        &mut self,
        doc: &mut Document,
        invocations: &[ScriptletInvocation],
        report: &mut ApplicationReport,
    ) {
        for invocation in invocations {
            let mut group = vec![invocation.name.clone()];
            group.extend(invocation.args.iter().cloned());
            let fingerprint = fingerprint_group("scriptlets", &group);
            if !self.mark_applied(fingerprint) {
                report.scriptlets.record(1, 1);
                continue;
            }

            match watch_scriptlet(doc, &self.registry, invocation, self.verbose) {
                Ok(observer) => {
                    self.observers.push(observer);
                    report.scriptlets.record(1, 1);
                }
                Err(ScriptletError::Unknown(name)) => {
                    log::warn!("unknown scriptlet '{name}' skipped for {}", self.page_url);
                    report.scriptlets.record(1, 0);
                }
                Err(err) => {
                    log::warn!(
                        "scriptlet '{}' failed for {}: {err}",
                        invocation.name,
                        self.page_url
                    );
                    self.error_reports.push(ScriptletErrorReport {
                        scriptlet_name: invocation.name.clone(),
                        error_message: err.to_string(),
                        url: self.page_url.clone(),
                    });
                    report.scriptlets.record(1, 0);
                }
            }
        }
    }
}
