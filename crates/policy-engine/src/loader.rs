use std::path::Path;

use serde_json::Value;

use crate::error::{json_kind, ConfigError};
use crate::schema::{resolve, Rule, UserRule};

/// The only major document version currently understood.
pub const SUPPORTED_MAJOR_VERSION: &str = "1";

/// Load a rule document from disk.
///
/// Files ending in `.json` are parsed as JSON, everything else as YAML.
pub fn load_rules_from_path<S: AsRef<str>>(
    path: impl AsRef<Path>,
    known_policy_names: &[S],
) -> Result<Vec<Rule>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        load_rules_from_json_str(&contents, known_policy_names)
    } else {
        load_rules_from_yaml_str(&contents, known_policy_names)
    }
}

/// Parse and load a rule document from a YAML string.
pub fn load_rules_from_yaml_str<S: AsRef<str>>(
    yaml: &str,
    known_policy_names: &[S],
) -> Result<Vec<Rule>, ConfigError> {
    let document: Value = serde_yml::from_str(yaml).map_err(|e| ConfigError::Parse {
        format: "YAML",
        reason: e.to_string(),
    })?;
    load_rules(&document, known_policy_names)
}

/// Parse and load a rule document from a JSON string.
pub fn load_rules_from_json_str<S: AsRef<str>>(
    json: &str,
    known_policy_names: &[S],
) -> Result<Vec<Rule>, ConfigError> {
    let document: Value = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
        format: "JSON",
        reason: e.to_string(),
    })?;
    load_rules(&document, known_policy_names)
}

/// Load rules from an already-parsed `{version, rules}` document.
///
/// The whole document is validated before any rule is resolved.
pub fn load_rules<S: AsRef<str>>(
    document: &Value,
    known_policy_names: &[S],
) -> Result<Vec<Rule>, ConfigError> {
    let map = document
        .as_object()
        .ok_or_else(|| ConfigError::InvalidDocument(json_kind(document)))?;

    let version = map.get("version").ok_or(ConfigError::MissingVersion)?;
    let major = major_version(version);

    if major != SUPPORTED_MAJOR_VERSION {
        return Err(ConfigError::UnsupportedVersion(major));
    }
    load_v1(map, known_policy_names)
}

fn load_v1<S: AsRef<str>>(
    document: &serde_json::Map<String, Value>,
    known_policy_names: &[S],
) -> Result<Vec<Rule>, ConfigError> {
    let raw_rules = document
        .get("rules")
        .ok_or(ConfigError::MissingRulesList)?
        .as_array()
        .ok_or(ConfigError::InvalidRulesList)?;

    let user_rules = raw_rules
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_user_rule(i, raw))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(count = user_rules.len(), "loaded v1 rule document");

    Ok(user_rules
        .into_iter()
        .map(|rule| resolve(rule, known_policy_names))
        .collect())
}

fn parse_user_rule(index: usize, raw: &Value) -> Result<UserRule, ConfigError> {
    if !raw.is_object() {
        return Err(ConfigError::InvalidRule {
            rule: anonymous_rule(index),
            reason: format!("expected a mapping, got {}", json_kind(raw)),
        });
    }

    serde_json::from_value(raw.clone()).map_err(|e| ConfigError::InvalidRule {
        rule: match raw.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => anonymous_rule(index),
        },
        reason: e.to_string(),
    })
}

fn anonymous_rule(index: usize) -> String {
    format!("<anonymous rule {index}>")
}

/// The integer prefix of a version before the first `.`, rendered as text.
///
/// `1`, `1.0`, `"1.2.3"` all have major version `"1"`.
fn major_version(version: &Value) -> String {
    let text = match version {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.split('.').next().unwrap_or_default().to_string()
}
