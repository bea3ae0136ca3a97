//! Built-in token policies.
//!
//! Every policy expects a token resource whose `data` looks like
//! `{"age": 12, "rotated_at": "2021-11-15T00:00:00", "scopes": ["pets:read"]}`.
//! A token missing the field a policy needs is a checker error, not a
//! decision.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use policy_engine::{
    checker_fn, PolicyChecker, PolicyDecision, PolicyRegistry, RegistryError, Resource, Rule,
};

/// Days a token may go without rotation unless a rule says otherwise.
pub const DEFAULT_MAX_ROTATION_DAYS: i64 = 30;

/// Register every built-in policy into `scope`.
///
/// `as_of` pins the reference time used by `token_age`; `None` reads the
/// clock on every check.
pub fn register_builtin(
    registry: &mut PolicyRegistry,
    scope: &str,
    as_of: Option<DateTime<Utc>>,
) -> Result<(), RegistryError> {
    registry.register_in(scope, "token_rotation", checker_fn(token_rotation))?;
    registry.register_in(scope, "token_age", TokenAge { as_of })?;
    registry.register_in(scope, "token_no_wildcard", checker_fn(token_no_wildcard))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// token_rotation
// ---------------------------------------------------------------------------

/// Deny tokens older than [`DEFAULT_MAX_ROTATION_DAYS`] by their `age` field.
async fn token_rotation(resource: Resource, _rule: Rule) -> anyhow::Result<PolicyDecision> {
    let age = resource
        .data()
        .get("age")
        .and_then(Value::as_i64)
        .with_context(|| format!("token {} has no integer `age`", resource.id()))?;

    if age > DEFAULT_MAX_ROTATION_DAYS {
        Ok(PolicyDecision::deny().with_reason("Token is too old"))
    } else {
        Ok(PolicyDecision::allow())
    }
}

// ---------------------------------------------------------------------------
// token_age
// ---------------------------------------------------------------------------

/// Grades a token by days since `rotated_at`.
///
/// Thresholds come from the selecting rule's context: `max_rotation_time`
/// (default 30) and `warn_rotation_time` (default 80% of the maximum).
#[derive(Debug, Clone, Copy)]
pub struct TokenAge {
    pub as_of: Option<DateTime<Utc>>,
}

#[async_trait]
impl PolicyChecker for TokenAge {
    async fn check(&self, resource: &Resource, rule: &Rule) -> anyhow::Result<PolicyDecision> {
        let max_days =
            context_days(rule, "max_rotation_time")?.unwrap_or(DEFAULT_MAX_ROTATION_DAYS);
        let warn_days =
            context_days(rule, "warn_rotation_time")?.unwrap_or((max_days as f64 * 0.8) as i64);

        let rotated_at = resource
            .data()
            .get("rotated_at")
            .and_then(Value::as_str)
            .with_context(|| format!("token {} has no string `rotated_at`", resource.id()))?;
        let rotated_at = parse_timestamp(rotated_at)
            .with_context(|| format!("token {} has an invalid `rotated_at`", resource.id()))?;

        let since = self.as_of.unwrap_or_else(Utc::now) - rotated_at;
        let detail = json!({"time_since_rotation": since.num_days()});

        let decision = if since > chrono::Duration::days(max_days) {
            PolicyDecision::deny().with_reason(format!(
                "Token has exceeded required timeframe for rotation ({max_days} days)"
            ))
        } else if since > chrono::Duration::days(warn_days) {
            PolicyDecision::warn().with_reason("Token needs to be rotated soon")
        } else {
            PolicyDecision::allow().with_reason("Token has been rotated recently")
        };
        Ok(decision.with_detail(detail))
    }
}

fn context_days(rule: &Rule, key: &str) -> anyhow::Result<Option<i64>> {
    match rule.context.as_ref().and_then(|c| c.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_i64() {
            Some(days) => Ok(Some(days)),
            None => bail!("rule {} has a non-integer `{key}`: {value}", rule.name),
        },
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC), or a
/// bare date.
fn parse_timestamp(text: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(t.and_utc());
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("unrecognised timestamp {text:?}"))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

// ---------------------------------------------------------------------------
// token_no_wildcard
// ---------------------------------------------------------------------------

/// Deny tokens holding any scope that contains `*`.
async fn token_no_wildcard(resource: Resource, _rule: Rule) -> anyhow::Result<PolicyDecision> {
    let scopes = resource
        .data()
        .get("scopes")
        .and_then(Value::as_array)
        .with_context(|| format!("token {} has no `scopes` list", resource.id()))?;

    let wildcards: Vec<&Value> = scopes
        .iter()
        .filter(|s| s.as_str().is_some_and(|s| s.contains('*')))
        .collect();

    if wildcards.is_empty() {
        Ok(PolicyDecision::allow())
    } else {
        Ok(PolicyDecision::deny()
            .with_reason("One or more policies has a wildcard")
            .with_detail(json!({"wildcard_policies": wildcards})))
    }
}
