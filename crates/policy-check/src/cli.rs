use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "policy-check",
    version,
    about = "Evaluate token policies against a resource inventory"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Path to the rule file (overrides config file setting)
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Path to the JSON resource list (overrides config file setting)
    #[arg(long)]
    pub resources: Option<PathBuf>,

    /// Policy scope to evaluate (overrides config file setting)
    #[arg(long)]
    pub scope: Option<String>,

    /// Reference time for age-based policies, RFC 3339 (defaults to now)
    #[arg(long)]
    pub as_of: Option<DateTime<Utc>>,

    /// Pretty-print the decision report
    #[arg(long)]
    pub pretty: bool,
}
