use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a rule document.
///
/// These are always produced before any resource is evaluated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`version` not found in rules")]
    MissingVersion,

    #[error("unsupported major version {0}")]
    UnsupportedVersion(String),

    #[error("`rules` list not found in rules")]
    MissingRulesList,

    #[error("`rules` should be a list of rules")]
    InvalidRulesList,

    #[error("invalid rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("rule document must be a mapping, got {0}")]
    InvalidDocument(&'static str),

    #[error("failed to read rule file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} rule document: {reason}")]
    Parse { format: &'static str, reason: String },
}

/// Errors raised by the [`PolicyRegistry`](crate::PolicyRegistry).
///
/// A failed registration leaves the registry untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("policy {name} has already been registered to scope {scope}")]
    DuplicateRegistration { scope: String, name: String },

    #[error("cannot register policy under name {0:?}")]
    InvalidName(String),

    #[error("unknown scope {0}")]
    UnknownScope(String),
}

/// Errors raised when untyped input cannot be turned into resources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("resource should be a mapping with a string `id`: {0}")]
    InvalidResource(String),

    #[error(
        "did not get expected list of resources ({0}) - use apply_value for singular resources"
    )]
    InvalidResourceList(String),
}

/// Errors raised while constructing a [`PolicyEngine`](crate::PolicyEngine).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors surfaced while applying policies to resources.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// A checker failed. The failure is passed through untouched, never
    /// turned into a decision.
    #[error("policy {policy} (from rule {rule}) failed for resource {resource}")]
    Checker {
        policy: String,
        rule: String,
        resource: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Short JSON type name used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "a mapping",
    }
}
