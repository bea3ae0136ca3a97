//! Named, scoped policy checkers.
//!
//! The registry has an explicit lifecycle: construct it, register checkers
//! into it, then hand a [`PolicySet`] snapshot of one scope to each engine.
//! Registration is additive only and a snapshot never observes later
//! registrations.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::decision::PolicyDecision;
use crate::error::RegistryError;
use crate::matcher::NEGATION_PREFIX;
use crate::resource::Resource;
use crate::schema::Rule;

/// Scope that always exists, even in an empty registry.
pub const DEFAULT_SCOPE: &str = "default";

/// An asynchronous policy check.
///
/// Receives the resource under evaluation and the rule that selected this
/// policy for it (including the rule's `context`). An `Err` is propagated to
/// the caller of the engine as-is.
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    async fn check(&self, resource: &Resource, rule: &Rule) -> anyhow::Result<PolicyDecision>;
}

pub type SharedChecker = Arc<dyn PolicyChecker>;

/// Adapter that lets a plain async closure act as a [`PolicyChecker`].
///
/// Built with [`checker_fn`].
pub struct FnChecker<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> PolicyChecker for FnChecker<F>
where
    F: Fn(Resource, Rule) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PolicyDecision>> + Send + 'static,
{
    async fn check(&self, resource: &Resource, rule: &Rule) -> anyhow::Result<PolicyDecision> {
        (self.f)(resource.clone(), rule.clone()).await
    }
}

/// Wrap an async function so it can be registered.
///
/// ```rust
/// use policy_engine::{checker_fn, PolicyDecision, PolicyRegistry};
///
/// let mut registry = PolicyRegistry::new();
/// registry
///     .register("always_allow", checker_fn(|_resource, _rule| async {
///         anyhow::Ok(PolicyDecision::allow())
///     }))
///     .unwrap();
/// ```
pub fn checker_fn<F, Fut>(f: F) -> FnChecker<F>
where
    F: Fn(Resource, Rule) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<PolicyDecision>> + Send + 'static,
{
    FnChecker { f }
}

/// Scoped mapping from policy name to checker.
pub struct PolicyRegistry {
    scopes: HashMap<String, IndexMap<String, SharedChecker>>,
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(DEFAULT_SCOPE.to_string(), IndexMap::new());
        Self { scopes }
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (scope, checkers) in &self.scopes {
            map.entry(scope, &checkers.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl PolicyRegistry {
    /// Create a registry holding only the empty default scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker under `name` in the default scope.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        checker: impl PolicyChecker + 'static,
    ) -> Result<(), RegistryError> {
        self.register_shared(DEFAULT_SCOPE, name, Arc::new(checker))
    }

    /// Register a checker under `name` in `scope`, creating the scope on
    /// first use.
    pub fn register_in(
        &mut self,
        scope: impl Into<String>,
        name: impl Into<String>,
        checker: impl PolicyChecker + 'static,
    ) -> Result<(), RegistryError> {
        self.register_shared(scope, name, Arc::new(checker))
    }

    /// Register an already shared checker.
    ///
    /// Fails without touching the registry if `name` is already taken in
    /// `scope`, or if `name` is empty or starts with the negation prefix
    /// (such a policy could never be selected by a pattern).
    pub fn register_shared(
        &mut self,
        scope: impl Into<String>,
        name: impl Into<String>,
        checker: SharedChecker,
    ) -> Result<(), RegistryError> {
        let scope = scope.into();
        let name = name.into();

        if name.is_empty() || name.starts_with(NEGATION_PREFIX) {
            return Err(RegistryError::InvalidName(name));
        }
        if self
            .scopes
            .get(&scope)
            .is_some_and(|checkers| checkers.contains_key(&name))
        {
            return Err(RegistryError::DuplicateRegistration { scope, name });
        }

        tracing::debug!(%scope, policy = %name, "registered policy");
        self.scopes.entry(scope).or_default().insert(name, checker);
        Ok(())
    }

    /// Snapshot the checkers of `scope`.
    pub fn get(&self, scope: &str) -> Result<PolicySet, RegistryError> {
        let checkers = self
            .scopes
            .get(scope)
            .ok_or_else(|| RegistryError::UnknownScope(scope.to_string()))?;

        Ok(PolicySet {
            scope: scope.to_string(),
            checkers: checkers.clone(),
        })
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains_key(scope)
    }
}

/// Read-only snapshot of one registry scope.
///
/// Names keep registration order, which is also the order in which a single
/// rule's policies appear in an execution plan.
#[derive(Clone, Default)]
pub struct PolicySet {
    scope: String,
    checkers: IndexMap<String, SharedChecker>,
}

impl fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySet")
            .field("scope", &self.scope)
            .field("policies", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicySet {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.checkers.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&SharedChecker> {
        self.checkers.get(name)
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}
