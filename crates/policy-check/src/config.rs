use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use policy_engine::DEFAULT_SCOPE;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    #[serde(default = "default_resources_file")]
    pub resources_file: PathBuf,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Reference time for age-based policies; `None` means now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            resources_file: default_resources_file(),
            scope: default_scope(),
            as_of: None,
            logging: LoggingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub pretty: bool,
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_rules_file() -> PathBuf {
    PathBuf::from("rules.yml")
}

fn default_resources_file() -> PathBuf {
    PathBuf::from("resources.json")
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `Ok(None)` when the file does not exist, so the caller can fall
/// back to defaults and report it once logging is up.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_is_reported_as_absent() {
        assert!(load(Path::new("/does/not/exist/config.yaml")).unwrap().is_none());
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.rules_file, PathBuf::from("rules.yml"));
        assert_eq!(cfg.scope, DEFAULT_SCOPE);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.output.pretty);
        assert!(cfg.as_of.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "scope: tokens\nas_of: 2021-12-02T00:00:00Z\noutput:\n  pretty: true"
        )
        .unwrap();

        let cfg = load(file.path()).unwrap().expect("file exists");
        assert_eq!(cfg.scope, "tokens");
        assert!(cfg.output.pretty);
        assert_eq!(cfg.resources_file, PathBuf::from("resources.json"));
        assert_eq!(
            cfg.as_of.map(|t| t.to_rfc3339()),
            Some("2021-12-02T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scope: [unterminated").unwrap();

        let err = load(file.path()).unwrap_err();
        assert!(
            err.to_string().contains("failed to parse config file"),
            "unexpected error: {err}"
        );
    }
}
