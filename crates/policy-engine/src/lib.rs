//! # policy-engine
//!
//! Decides which named policy checks apply to which resources, then runs
//! them.  Rules pair resource glob patterns with policy glob patterns; a
//! weight decides which rule has the last word when several apply to the
//! same resource.  Checkers are async and run concurrently.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use policy_engine::{checker_fn, PolicyDecision, PolicyEngine, PolicyRegistry, Resource};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut registry = PolicyRegistry::new();
//! registry.register("token_rotation", checker_fn(|_resource, _rule| async {
//!     anyhow::Ok(PolicyDecision::allow())
//! }))?;
//!
//! let engine = PolicyEngine::from_path("rules.yml", &registry, "default")?;
//! let decisions = engine.apply_one(&Resource::bare("my_token")).await?;
//! println!("{decisions:?}");
//! # Ok(())
//! # }
//! ```

mod decision;
mod error;
mod evaluator;
pub mod loader;
pub mod matcher;
pub mod planner;
mod registry;
mod resource;
mod schema;

// Re-export primary public API at crate root.
pub use decision::{DecisionAction, PolicyDecision};
pub use error::{BuildError, ConfigError, EngineError, InputError, RegistryError};
pub use evaluator::{BatchDecisions, Decisions, PolicyEngine};
pub use planner::{ExecutionPlan, ExecutionPlanStep, ExecutionPlanner};
pub use registry::{
    checker_fn, FnChecker, PolicyChecker, PolicyRegistry, PolicySet, SharedChecker, DEFAULT_SCOPE,
};
pub use resource::Resource;
pub use schema::{resolve, Patterns, Rule, UserRule, DEFAULT_WEIGHT};
