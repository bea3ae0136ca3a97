//! Turns the loaded rules into a per-resource execution plan.
//!
//! Rules are ordered by ascending weight (load order breaks ties). For one
//! resource, the rules whose resource patterns include it are the
//! *effective* rules. These are then walked from the heaviest down: each rule
//! contributes the policies it includes that no heavier rule has already
//! touched, and then marks every policy it touched (included *or* excluded)
//! as settled.
//!
//! The consequence is "last word, not last strongest word": once a heavier
//! rule has expressed any opinion on a policy, no lighter rule can re-include
//! it for that resource, even if the heavier rule only excluded it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::matcher::CompiledPatterns;
use crate::schema::Rule;

/// One concrete policy invocation for a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlanStep {
    pub policy_name: String,
    pub rule: Arc<Rule>,
}

impl fmt::Display for ExecutionPlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rule.name, self.policy_name)
    }
}

/// Ordered steps for one resource; no policy name appears twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    steps: Vec<ExecutionPlanStep>,
}

impl ExecutionPlan {
    pub fn steps(&self) -> &[ExecutionPlanStep] {
        &self.steps
    }

    pub fn policy_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.steps.iter().map(|s| s.policy_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl IntoIterator for ExecutionPlan {
    type Item = ExecutionPlanStep;
    type IntoIter = std::vec::IntoIter<ExecutionPlanStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{step}")?;
        }
        f.write_str("]")
    }
}

/// A rule with its patterns compiled against a fixed set of policy names.
///
/// Which policies a rule includes or touches does not depend on the resource,
/// so both lists are computed once.
#[derive(Debug)]
struct PlannedRule {
    rule: Arc<Rule>,
    resources: CompiledPatterns,
    included_policies: Vec<String>,
    touched_policies: Vec<String>,
}

/// Plans policy invocations for resources against a fixed rule set and a
/// fixed list of policy names.
#[derive(Debug)]
pub struct ExecutionPlanner {
    /// Ascending by weight, load order within equal weights.
    rules: Vec<PlannedRule>,
}

impl ExecutionPlanner {
    pub fn new<S: AsRef<str>>(rules: &[Arc<Rule>], policy_names: &[S]) -> Self {
        let mut ordered: Vec<Arc<Rule>> = rules.to_vec();
        // Stable, so equal weights keep load order.
        ordered.sort_by_key(|r| r.weight);

        let rules = ordered
            .into_iter()
            .map(|rule| {
                let policies =
                    CompiledPatterns::new(&rule.policy_patterns).matches(policy_names);
                if !policy_names.is_empty() && policies.matched().is_empty() {
                    tracing::trace!(
                        rule = %rule.name,
                        "rule policy patterns match no known policy"
                    );
                }
                PlannedRule {
                    resources: CompiledPatterns::new(&rule.resource_patterns),
                    included_policies: policies.include().into_iter().map(String::from).collect(),
                    touched_policies: policies.matched().into_iter().map(String::from).collect(),
                    rule,
                }
            })
            .collect();

        Self { rules }
    }

    /// Rules whose resource patterns include `resource_id`, ascending by
    /// weight.
    pub fn effective_rules(&self, resource_id: &str) -> Vec<&Arc<Rule>> {
        self.rules
            .iter()
            .filter(|p| p.resources.includes(resource_id))
            .map(|p| &p.rule)
            .collect()
    }

    /// Build the execution plan for one resource.
    pub fn plan(&self, resource_id: &str) -> ExecutionPlan {
        let mut steps = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        let effective = self
            .rules
            .iter()
            .rev()
            .filter(|p| p.resources.includes(resource_id));

        for planned in effective {
            tracing::trace!(
                resource = resource_id,
                rule = %planned.rule.name,
                weight = planned.rule.weight,
                "rule applies to resource"
            );
            steps.extend(
                planned
                    .included_policies
                    .iter()
                    .filter(|name| !seen.contains(name.as_str()))
                    .map(|name| ExecutionPlanStep {
                        policy_name: name.clone(),
                        rule: Arc::clone(&planned.rule),
                    }),
            );
            seen.extend(planned.touched_policies.iter().map(String::as_str));
        }

        ExecutionPlan { steps }
    }
}

/// Plan `resource_id` against `rules` and `registered_policy_names` in one
/// call.
pub fn plan<S: AsRef<str>>(
    resource_id: &str,
    rules: &[Rule],
    registered_policy_names: &[S],
) -> ExecutionPlan {
    let rules: Vec<Arc<Rule>> = rules.iter().cloned().map(Arc::new).collect();
    ExecutionPlanner::new(&rules, registered_policy_names).plan(resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{resolve, UserRule};

    fn rule(user: UserRule) -> Rule {
        resolve(user, &[] as &[&str])
    }

    fn steps(plan: &ExecutionPlan) -> Vec<String> {
        plan.steps().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_effective_rules_gives_empty_plan() {
        let rules = [rule(UserRule::new("simple_rule", "do_not_match_*", "not_used"))];
        let p = plan("my_resource", &rules, &["not_used"]);
        assert!(p.is_empty());
    }

    #[test]
    fn unregistered_policy_never_runs() {
        let rules = [rule(UserRule::new("simple_rule", "my_resource", "no_such_policy"))];
        assert!(plan("my_resource", &rules, &["my_policy"]).is_empty());
    }

    #[test]
    fn single_rule_selects_matching_policies() {
        let rules = [rule(UserRule::new("r", "*", "token_*"))];
        let p = plan("x", &rules, &["token_age", "other", "token_no_wildcard"]);
        assert_eq!(
            p.policy_names().collect::<Vec<_>>(),
            ["token_age", "token_no_wildcard"]
        );
    }

    #[test]
    fn heavier_exclusion_overrides_lighter_inclusion() {
        let rules = [
            rule(UserRule::new("a", "*", "*").with_weight(1)),
            rule(UserRule::new("b", "res", "!X").with_weight(100)),
        ];
        let p = plan("res", &rules, &["X", "Y"]);
        // `!X` starts from every policy, so `b` also claims `Y`.
        assert_eq!(steps(&p), ["b:Y"]);

        let other = plan("other", &rules, &["X", "Y"]);
        assert_eq!(steps(&other), ["a:X", "a:Y"]);
    }

    #[test]
    fn lighter_rule_cannot_reinclude_touched_policy() {
        let rules = [
            rule(UserRule::new("low", "*", "token_rotation").with_weight(1)),
            rule(UserRule::new("high", "*", ["token_*", "!token_rotation"]).with_weight(50)),
        ];
        let p = plan("t", &rules, &["token_rotation", "token_age"]);
        assert_eq!(steps(&p), ["high:token_age"]);
    }

    #[test]
    fn heavier_rule_is_planned_first() {
        let rules = [
            rule(UserRule::new("base", "*", "*").with_weight(1)),
            rule(
                UserRule::new("frank", "frank_*", "token_age")
                    .with_context(serde_json::json!({"max_rotation_time": 365})),
            ),
        ];
        let p = plan("frank_token", &rules, &["token_age", "token_no_wildcard"]);
        assert_eq!(steps(&p), ["frank:token_age", "base:token_no_wildcard"]);
        assert!(p.steps()[0].rule.context.is_some());
    }

    #[test]
    fn equal_weights_later_rule_wins() {
        let rules = [
            rule(UserRule::new("first", "*", "p")),
            rule(UserRule::new("second", "*", "p")),
        ];
        assert_eq!(steps(&plan("x", &rules, &["p"])), ["second:p"]);
    }

    #[test]
    fn equal_weights_keep_load_order_when_not_adjacent() {
        let rules = [
            rule(UserRule::new("first", "*", "p").with_weight(10)),
            rule(UserRule::new("light", "*", "q").with_weight(1)),
            rule(UserRule::new("second", "*", "p").with_weight(10)),
        ];
        let planner = ExecutionPlanner::new(
            &rules.iter().cloned().map(Arc::new).collect::<Vec<_>>(),
            &["p", "q"],
        );
        let names: Vec<&str> = planner
            .effective_rules("x")
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, ["light", "first", "second"]);
        assert_eq!(steps(&planner.plan("x")), ["second:p", "light:q"]);
    }

    #[test]
    fn effective_rules_outlive_resource_id() {
        let rules = [Arc::new(rule(UserRule::new("r", "tok_*", "p")))];
        let planner = ExecutionPlanner::new(&rules, &["p"]);

        let effective = {
            let id = String::from("tok_1");
            planner.effective_rules(&id)
        };
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].name, "r");
    }

    #[test]
    fn unmatched_policy_patterns_still_plan_other_rules() {
        let rules = [
            rule(UserRule::new("typo", "*", "token_agee")),
            rule(UserRule::new("real", "*", "token_age").with_weight(1)),
        ];
        assert_eq!(steps(&plan("x", &rules, &["token_age"])), ["real:token_age"]);
    }

    #[test]
    fn weight_order_not_load_order() {
        let rules = [
            rule(UserRule::new("heavy", "*", "!p").with_weight(500)),
            rule(UserRule::new("light", "*", "p").with_weight(-3)),
        ];
        assert!(plan("x", &rules, &["p"]).is_empty());
    }

    #[test]
    fn policies_are_never_duplicated() {
        let rules = [
            rule(UserRule::new("a", "*", ["p", "q"]).with_weight(1)),
            rule(UserRule::new("b", "*", ["q", "p"]).with_weight(2)),
            rule(UserRule::new("c", "*", "*").with_weight(3)),
        ];
        let p = plan("x", &rules, &["p", "q", "r"]);
        assert_eq!(steps(&p), ["c:p", "c:q", "c:r"]);
    }

    #[test]
    fn resource_exclusion_within_rule() {
        let rules = [rule(UserRule::new("r", ["team_*", "!team_bot"], "p"))];
        assert_eq!(plan("team_alice", &rules, &["p"]).len(), 1);
        assert!(plan("team_bot", &rules, &["p"]).is_empty());
    }

    #[test]
    fn token_rotation_scenario() {
        let rules = [
            rule(UserRule::new("r1", "*", "token_rotation")),
            rule(UserRule::new("r2", ["longlived_*", "alice"], "!token_rotation")),
        ];
        let names = ["token_rotation"];
        assert_eq!(steps(&plan("my_token", &rules, &names)), ["r1:token_rotation"]);
        assert!(plan("longlived_a", &rules, &names).is_empty());
        assert!(plan("alice", &rules, &names).is_empty());
    }

    #[test]
    fn plan_display() {
        let rules = [rule(UserRule::new("r", "*", "*"))];
        let p = plan("x", &rules, &["a", "b"]);
        assert_eq!(p.to_string(), "[r:a, r:b]");
    }
}
