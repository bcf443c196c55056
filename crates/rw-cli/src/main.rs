//! RuleWire CLI
//!
//! CLI tool for inspecting rule payloads, warming the rule caches from a
//! rules directory, and simulating a full delivery + application pass
//! against a static in-process engine.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};

use rw_core::{fingerprint_ruleset, DeliveryConfig, RuleSet};
use rw_delivery::{
    Coordinator, DeliveryService, Gateway, LocalChannel, Preloader, StaticEngine,
};
use rw_page::{DomHidingEngine, Document, RuleApplier, ScriptletRegistry, SimScriptHost};

/// Chunk size used by the simulated engine, small enough that realistic
/// payloads exercise the chunked continuation path.
const SIM_CHUNK_SIZE: usize = 4096;

#[derive(Parser)]
#[command(name = "rw-cli")]
#[command(about = "RuleWire rule-delivery inspection and simulation tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a RuleSet JSON payload
    Inspect {
        /// RuleSet JSON file to inspect
        #[arg(short, long)]
        input: String,
    },

    /// Warm the delivery caches from a rules directory
    Warm {
        /// Directory of <hostname>.json RuleSet payloads
        #[arg(short, long)]
        rules: String,

        /// Optional delivery config JSON file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Simulate a delivery + application pass for one page URL
    Apply {
        /// Directory of <hostname>.json RuleSet payloads
        #[arg(short, long)]
        rules: String,

        /// Page URL to resolve and apply rules for
        #[arg(short, long)]
        url: String,

        /// Optional delivery config JSON file
        #[arg(short, long)]
        config: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Inspect { input } => cmd_inspect(&input),
        Commands::Warm { rules, config } => cmd_warm(&rules, config.as_deref()),
        Commands::Apply {
            rules,
            url,
            config,
            verbose,
        } => cmd_apply(&rules, &url, config.as_deref(), verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_inspect(input: &str) -> Result<(), String> {
    let payload = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    let set = RuleSet::from_json(&payload)
        .map_err(|e| format!("Invalid rule set: {}", e))?;

    println!("Rule set: {}", input);
    println!("  cssInject:    {} rules", set.css_inject.len());
    println!("  cssExtended:  {} rules", set.css_extended.len());
    println!("  scripts:      {} blocks", set.scripts.len());
    println!("  scriptlets:   {} invocations", set.scriptlets.len());
    println!("  Total:        {} rules", set.rule_count());
    println!("  Fingerprint:  {:016x}", fingerprint_ruleset(&set));
    for invocation in &set.scriptlets {
        println!("    - {} {:?}", invocation.name, invocation.args);
    }
    Ok(())
}

fn cmd_warm(rules_dir: &str, config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    let engine = load_engine(rules_dir)?;
    let hostnames = engine.hostnames();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(async {
        let start = Instant::now();
        let coordinator = Coordinator::new(engine, &config);
        let preloader = Preloader::new(Arc::clone(&coordinator));

        let warmed = preloader.warm(&hostnames).await;
        let (bounded, pinned) = coordinator.cache_stats();

        println!("Warmed {}/{} hostnames from '{}'", warmed, hostnames.len(), rules_dir);
        println!("  Bounded cache: {} entries", bounded);
        println!("  Pinned cache:  {} entries", pinned);
        println!("  Time:          {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    })
}

fn cmd_apply(
    rules_dir: &str,
    url: &str,
    config_path: Option<&str>,
    verbose: bool,
) -> Result<(), String> {
    let config = load_config(config_path)?;
    let engine = load_engine(rules_dir)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_apply(engine, &config, url, verbose))
}

/// Full pipeline pass: static engine -> coordinator -> service -> gateway,
/// then apply the delivered rule set to a synthetic document.
async fn run_apply(
    engine: StaticEngine,
    config: &DeliveryConfig,
    url: &str,
    verbose: bool,
) -> Result<(), String> {
    let start = Instant::now();
    let coordinator = Coordinator::new(engine, config);
    let service = Arc::new(DeliveryService::new(coordinator));
    let gateway = Gateway::new(LocalChannel::new(service), config);

    let set = gateway
        .request_rules(url)
        .await
        .map_err(|e| format!("Rule delivery failed: {}", e))?;
    let delivery_time = start.elapsed();

    println!("Delivered {} rules for {} in {:.1}ms",
        set.rule_count(), url, delivery_time.as_secs_f64() * 1000.0);
    if set.is_empty() {
        println!("  Nothing to apply");
        return Ok(());
    }

    let mut doc = sample_document();
    let mut applier = RuleApplier::new(
        url,
        ScriptletRegistry::with_builtins(),
        Box::new(DomHidingEngine),
        Box::new(SimScriptHost),
        verbose,
    );
    let report = applier.apply_all(&mut doc, &set);

    println!("Application report:");
    for (label, stats) in report.categories() {
        println!("  {:<13} {}/{} succeeded", label, stats.succeeded, stats.attempted);
    }
    println!("  Stylesheets:  {}", doc.stylesheet_count());
    println!("  Scripts:      {}", doc.script_count());

    let errors = applier.take_error_reports();
    if !errors.is_empty() {
        println!("Scriptlet errors:");
        for report in errors {
            println!("  {} - {}", report.scriptlet_name, report.error_message);
        }
    }
    Ok(())
}

/// A small synthetic page with the markup shapes rules usually target:
/// a classed banner, an inline handler, and a shadow-DOM widget.
fn sample_document() -> Document {
    let mut doc = Document::new();
    let body = doc.create_element("body");
    doc.append_child(doc.root(), body);

    let banner = doc.create_element("div");
    doc.set_attribute(banner, "class", "banner ad");
    doc.set_attribute(banner, "onclick", "track()");
    doc.append_child(body, banner);

    let host = doc.create_element("ad-widget");
    doc.append_child(body, host);
    let shadow = doc.attach_shadow(host);
    let beacon = doc.create_element("img");
    doc.set_attribute(beacon, "data-beacon", "1");
    doc.append_child(shadow, beacon);

    doc
}

fn load_config(path: Option<&str>) -> Result<DeliveryConfig, String> {
    match path {
        Some(path) => {
            let payload = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            DeliveryConfig::from_json(&payload)
                .map_err(|e| format!("Invalid config '{}': {}", path, e))
        }
        None => Ok(DeliveryConfig::default()),
    }
}

/// Build a static engine from a directory of `<hostname>.json` payloads.
fn load_engine(rules_dir: &str) -> Result<StaticEngine, String> {
    let mut payloads = HashMap::new();
    let entries = fs::read_dir(rules_dir)
        .map_err(|e| format!("Failed to read '{}': {}", rules_dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to list '{}': {}", rules_dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let Some(hostname) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let payload = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        // Validate up front so a bad file fails loudly here, not mid-delivery
        RuleSet::from_json(&payload)
            .map_err(|e| format!("Invalid rule set '{}': {}", path.display(), e))?;
        payloads.insert(hostname.to_string(), payload);
    }

    if payloads.is_empty() {
        return Err(format!(
            "No .json rule files found in '{}'",
            Path::new(rules_dir).display()
        ));
    }

    let mut engine = StaticEngine::new(SIM_CHUNK_SIZE);
    for (hostname, payload) in payloads {
        engine.insert(&hostname, payload);
    }
    Ok(engine)
}
