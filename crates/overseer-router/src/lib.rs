//! Task analysis and routing for the Overseer supervisor.
//!
//! The [`Router`] turns a [`overseer_core::TaskAnalysis`] into a validated
//! [`overseer_core::RoutingDecision`]. Decisions are memoised in the
//! [`RoutingCache`]; the reasoning module they are produced with lives in the
//! [`ModuleCache`] and is recompiled lazily by a [`ModuleCompiler`] whenever
//! the training set changes.

/// Task analyzer.
pub mod analyzer;
/// Module compilers and their objective.
pub mod compiler;
/// Compiled-module cache.
pub mod module_cache;
/// Router and routing invariants.
pub mod router;
/// TTL cache of routing decisions.
pub mod routing_cache;

pub use analyzer::{validate_task, TaskAnalyzer};
pub use compiler::{
    compiler_for, routing_metric, BootstrapFewShot, LabeledFewShot, ModuleCompiler,
    StaticTraining, TrainingSource,
};
pub use module_cache::{signature_hash, ModuleCache, ModuleMeta, ModuleState};
pub use router::{
    assert_mode_agent_consistency, assert_valid_agents, assert_valid_tools, normalize_decision,
    tie_break, Router,
};
pub use routing_cache::RoutingCache;
