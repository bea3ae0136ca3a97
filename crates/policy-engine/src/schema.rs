use serde::{Deserialize, Serialize};

/// Weight given to rules that do not specify one.
pub const DEFAULT_WEIGHT: i64 = 100;

/// A single pattern or an ordered list of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Patterns {
    /// Coerce into a list, wrapping a single pattern. Order is kept and
    /// nothing is deduplicated.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Patterns::One(p) => vec![p],
            Patterns::Many(ps) => ps,
        }
    }
}

impl From<&str> for Patterns {
    fn from(p: &str) -> Self {
        Patterns::One(p.to_string())
    }
}

impl From<String> for Patterns {
    fn from(p: String) -> Self {
        Patterns::One(p)
    }
}

impl<S: Into<String>> From<Vec<S>> for Patterns {
    fn from(ps: Vec<S>) -> Self {
        Patterns::Many(ps.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Patterns {
    fn from(ps: [S; N]) -> Self {
        Patterns::Many(ps.into_iter().map(Into::into).collect())
    }
}

/// A rule as written by a user, before defaults are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRule {
    /// Name of the rule.
    pub name: String,
    /// Optional description; defaults to `name`.
    #[serde(default)]
    pub description: Option<String>,
    /// Higher weights are applied later and override lower ones. Default 100.
    #[serde(default)]
    pub weight: Option<i64>,
    /// Pattern(s) matched against resource ids.
    pub resources: Patterns,
    /// Pattern(s) matched against registered policy names.
    pub policies: Patterns,
    /// Extra data handed to every policy run under this rule.
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

impl UserRule {
    pub fn new(
        name: impl Into<String>,
        resources: impl Into<Patterns>,
        policies: impl Into<Patterns>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            weight: None,
            resources: resources.into(),
            policies: policies.into(),
            context: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// A fully resolved rule. Every optional field of [`UserRule`] has been
/// filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub weight: i64,
    pub resource_patterns: Vec<String>,
    pub policy_patterns: Vec<String>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

/// Resolve the optional fields of a [`UserRule`] into a concrete [`Rule`].
///
/// Policy patterns are not validated against the known policy names; a
/// pattern naming an unknown policy simply never matches at plan time.
pub fn resolve<S: AsRef<str>>(user_rule: UserRule, _known_policy_names: &[S]) -> Rule {
    let UserRule {
        name,
        description,
        weight,
        resources,
        policies,
        context,
    } = user_rule;

    Rule {
        description: description.unwrap_or_else(|| name.clone()),
        name,
        weight: weight.unwrap_or(DEFAULT_WEIGHT),
        resource_patterns: resources.into_vec(),
        policy_patterns: policies.into_vec(),
        context,
    }
}
