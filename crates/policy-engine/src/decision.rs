use serde::{Deserialize, Serialize};

/// The outcome of one policy check against one resource under one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// What the caller should do with the resource.
    pub action: DecisionAction,
    /// Human-readable reason explaining the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Structured detail intended for audit logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Action produced by a policy checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Resource passes the policy.
    Allow,
    /// Resource passes the policy but a warning should be raised.
    Warn,
    /// Resource does not pass the policy.
    Deny,
}

impl PolicyDecision {
    pub fn new(action: DecisionAction) -> Self {
        Self {
            action,
            reason: None,
            detail: None,
        }
    }

    /// Convenience constructor for an allow decision.
    pub fn allow() -> Self {
        Self::new(DecisionAction::Allow)
    }

    /// Convenience constructor for a warning decision.
    pub fn warn() -> Self {
        Self::new(DecisionAction::Warn)
    }

    /// Convenience constructor for a deny decision.
    pub fn deny() -> Self {
        Self::new(DecisionAction::Deny)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_has_no_reason_or_detail() {
        let d = PolicyDecision::allow();
        assert_eq!(d.action, DecisionAction::Allow);
        assert!(d.reason.is_none());
        assert!(d.detail.is_none());
    }

    #[test]
    fn builders_set_fields() {
        let d = PolicyDecision::deny()
            .with_reason("too old")
            .with_detail(serde_json::json!({"age": 60}));
        assert_eq!(d.action, DecisionAction::Deny);
        assert_eq!(d.reason.as_deref(), Some("too old"));
        assert_eq!(d.detail, Some(serde_json::json!({"age": 60})));
    }

    #[test]
    fn actions_serialize_lowercase() {
        let json = serde_json::to_value(PolicyDecision::warn().with_reason("soon")).unwrap();
        assert_eq!(json, serde_json::json!({"action": "warn", "reason": "soon"}));

        let back: PolicyDecision =
            serde_json::from_value(serde_json::json!({"action": "deny"})).unwrap();
        assert_eq!(back, PolicyDecision::deny());
    }

    #[test]
    fn action_equality() {
        assert_eq!(DecisionAction::Allow, DecisionAction::Allow);
        assert_ne!(DecisionAction::Allow, DecisionAction::Deny);
        assert_ne!(DecisionAction::Warn, DecisionAction::Deny);
    }
}
