use std::path::Path;
use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::IndexMap;
use tracing::debug;

use crate::decision::PolicyDecision;
use crate::error::{BuildError, EngineError, RegistryError};
use crate::loader;
use crate::planner::{ExecutionPlan, ExecutionPlanStep, ExecutionPlanner};
use crate::registry::{PolicyRegistry, PolicySet};
use crate::resource::Resource;
use crate::schema::{resolve, Rule, UserRule};

/// Decisions for one resource, keyed by policy name in plan order.
pub type Decisions = IndexMap<String, PolicyDecision>;

/// Decisions for a batch of resources, keyed by resource id.
pub type BatchDecisions = IndexMap<String, Decisions>;

/// Applies a fixed rule set and a fixed snapshot of policy checkers to
/// resources.
///
/// Rules and checkers are read-only once the engine is built; registering
/// more policies in the originating [`PolicyRegistry`] does not affect an
/// existing engine.
///
/// Checkers for one resource run concurrently on the calling task, as do the
/// resources of a batch. There is no timeout: a checker that never completes
/// stalls the whole call.
pub struct PolicyEngine {
    /// Rules in load order.
    rules: Vec<Arc<Rule>>,
    policies: PolicySet,
    planner: ExecutionPlanner,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("scope", &self.policies.scope())
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            )
            .field("policies", &self.policy_names())
            .finish()
    }
}

impl PolicyEngine {
    /// Create an engine from resolved rules and a policy snapshot.
    pub fn new(rules: Vec<Rule>, policies: PolicySet) -> Self {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        let names: Vec<&str> = policies.names().collect();
        let planner = ExecutionPlanner::new(&rules, &names);

        Self {
            rules,
            policies,
            planner,
        }
    }

    /// Create an engine from resolved rules, snapshotting `scope`.
    pub fn from_rules(
        rules: Vec<Rule>,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self::new(rules, registry.get(scope)?))
    }

    /// Resolve user rules against `scope` and create an engine from them.
    pub fn from_user_rules(
        user_rules: Vec<UserRule>,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, RegistryError> {
        let policies = registry.get(scope)?;
        let names: Vec<&str> = policies.names().collect();
        let rules = user_rules
            .into_iter()
            .map(|user| resolve(user, &names))
            .collect();
        Ok(Self::new(rules, policies))
    }

    /// Load a raw `{version, rules}` document and create an engine from it.
    pub fn from_document(
        document: &serde_json::Value,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, BuildError> {
        let policies = registry.get(scope)?;
        let names: Vec<&str> = policies.names().collect();
        let rules = loader::load_rules(document, &names)?;
        Ok(Self::new(rules, policies))
    }

    /// Load a YAML rule document and create an engine from it.
    pub fn from_yaml_str(
        yaml: &str,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, BuildError> {
        let policies = registry.get(scope)?;
        let names: Vec<&str> = policies.names().collect();
        let rules = loader::load_rules_from_yaml_str(yaml, &names)?;
        Ok(Self::new(rules, policies))
    }

    /// Load a JSON rule document and create an engine from it.
    pub fn from_json_str(
        json: &str,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, BuildError> {
        let policies = registry.get(scope)?;
        let names: Vec<&str> = policies.names().collect();
        let rules = loader::load_rules_from_json_str(json, &names)?;
        Ok(Self::new(rules, policies))
    }

    /// Load a rule file (YAML or JSON, by extension) and create an engine
    /// from it.
    pub fn from_path(
        path: impl AsRef<Path>,
        registry: &PolicyRegistry,
        scope: &str,
    ) -> Result<Self, BuildError> {
        let policies = registry.get(scope)?;
        let names: Vec<&str> = policies.names().collect();
        let rules = loader::load_rules_from_path(path, &names)?;
        Ok(Self::new(rules, policies))
    }

    pub fn scope(&self) -> &str {
        self.policies.scope()
    }

    /// Rules in load order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.names().collect()
    }

    /// The execution plan `apply_one` would run for `resource_id`.
    pub fn plan(&self, resource_id: &str) -> ExecutionPlan {
        self.planner.plan(resource_id)
    }

    // -- Apply entry points ---------------------------------------------------

    /// Run every planned policy against `resource`.
    ///
    /// A resource no rule applies to yields an empty mapping. The first
    /// checker error aborts the call and is returned.
    pub async fn apply_one(&self, resource: &Resource) -> Result<Decisions, EngineError> {
        let plan = self.planner.plan(resource.id());
        debug!(resource = resource.id(), %plan, "processing resource");

        let decisions =
            try_join_all(plan.steps().iter().map(|step| self.execute(step, resource))).await?;

        Ok(plan
            .into_iter()
            .map(|step| step.policy_name)
            .zip(decisions)
            .collect())
    }

    /// Run [`apply_one`](Self::apply_one) for every resource concurrently.
    ///
    /// If two resources share an id, the later one's decisions are kept.
    pub async fn apply_all(&self, resources: &[Resource]) -> Result<BatchDecisions, EngineError> {
        let results = try_join_all(resources.iter().map(|r| self.apply_one(r))).await?;

        Ok(resources
            .iter()
            .map(|r| r.id().to_string())
            .zip(results)
            .collect())
    }

    /// Validate an untyped resource and apply policies to it.
    pub async fn apply_value(&self, value: &serde_json::Value) -> Result<Decisions, EngineError> {
        let resource = Resource::from_value(value)?;
        self.apply_one(&resource).await
    }

    /// Validate an untyped list of resources and apply policies to all of
    /// them. Nothing runs unless every element is a valid resource.
    pub async fn apply_all_value(
        &self,
        value: &serde_json::Value,
    ) -> Result<BatchDecisions, EngineError> {
        let resources = Resource::list_from_value(value)?;
        self.apply_all(&resources).await
    }

    // -- Helpers --------------------------------------------------------------

    async fn execute(
        &self,
        step: &ExecutionPlanStep,
        resource: &Resource,
    ) -> Result<PolicyDecision, EngineError> {
        debug!(
            policy = %step.policy_name,
            rule = %step.rule.name,
            resource = resource.id(),
            "executing policy"
        );

        let checker_error = |source| EngineError::Checker {
            policy: step.policy_name.clone(),
            rule: step.rule.name.clone(),
            resource: resource.id().to_string(),
            source,
        };

        let checker = self
            .policies
            .get(&step.policy_name)
            .ok_or_else(|| checker_error(anyhow::anyhow!("policy is not registered")))?;

        checker
            .check(resource, &step.rule)
            .await
            .map_err(checker_error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
