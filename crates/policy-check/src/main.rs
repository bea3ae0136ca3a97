mod cli;
mod config;
mod policies;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use policy_engine::{BatchDecisions, DecisionAction, PolicyEngine, PolicyRegistry};

use crate::cli::Cli;
use crate::config::Config;

/// Build the engine described by `cfg` and run it over the resource file.
async fn evaluate(cfg: &Config) -> Result<BatchDecisions> {
    let mut registry = PolicyRegistry::new();
    policies::register_builtin(&mut registry, &cfg.scope, cfg.as_of)
        .context("failed to register built-in policies")?;

    let engine = PolicyEngine::from_path(&cfg.rules_file, &registry, &cfg.scope)
        .with_context(|| format!("failed to load rule file {}", cfg.rules_file.display()))?;

    info!(
        rules_file = %cfg.rules_file.display(),
        ?engine,
        "policy engine loaded"
    );

    let contents = std::fs::read_to_string(&cfg.resources_file).with_context(|| {
        format!(
            "failed to read resource file {}",
            cfg.resources_file.display()
        )
    })?;
    let resources: serde_json::Value = serde_json::from_str(&contents).with_context(|| {
        format!(
            "failed to parse resource file {}",
            cfg.resources_file.display()
        )
    })?;

    let decisions = engine
        .apply_all_value(&resources)
        .await
        .context("policy evaluation failed")?;

    Ok(decisions)
}

fn count_actions(decisions: &BatchDecisions, action: DecisionAction) -> usize {
    decisions
        .values()
        .flat_map(|per_resource| per_resource.values())
        .filter(|d| d.action == action)
        .count()
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let file_cfg = config::load(&cli.config)?;
    let config_found = file_cfg.is_some();
    let mut cfg = file_cfg.unwrap_or_default();

    if let Some(ref rules) = cli.rules {
        cfg.rules_file = rules.clone();
    }
    if let Some(ref resources) = cli.resources {
        cfg.resources_file = resources.clone();
    }
    if let Some(ref scope) = cli.scope {
        cfg.scope = scope.clone();
    }
    if cli.as_of.is_some() {
        cfg.as_of = cli.as_of;
    }
    if cli.pretty {
        cfg.output.pretty = true;
    }

    // 3. Init tracing-subscriber with JSON format on stderr; stdout carries
    //    the report.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    info!(
        config_file = %cli.config.display(),
        rules_file = %cfg.rules_file.display(),
        resources_file = %cfg.resources_file.display(),
        scope = %cfg.scope,
        "policy-check starting"
    );

    // 4. Evaluate.
    let decisions = evaluate(&cfg).await?;

    info!(
        resources = decisions.len(),
        denied = count_actions(&decisions, DecisionAction::Deny),
        warned = count_actions(&decisions, DecisionAction::Warn),
        "evaluation complete"
    );

    // 5. Report.
    let report = if cfg.output.pretty {
        serde_json::to_string_pretty(&decisions)
    } else {
        serde_json::to_string(&decisions)
    }
    .context("failed to serialize decisions")?;
    println!("{report}");

    Ok(())
}
