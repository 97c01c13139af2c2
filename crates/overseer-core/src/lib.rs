//! Core types and error definitions for the Overseer supervisor.
//!
//! This crate provides the foundational types shared across all Overseer crates:
//! the error taxonomy, the routing data model, the team roster and the static
//! tool registry.
//!
//! # Main types
//!
//! - [`OverseerError`]: Unified error enum for all Overseer subsystems.
//! - [`OverseerResult`]: Convenience alias for `Result<T, OverseerError>`.
//! - [`RoutingDecision`]: Who works on a task and in which [`ExecutionMode`].
//! - [`HistoryEntry`]: One persisted run.
//! - [`TrainingExample`]: A labelled routing example.
//! - [`TeamRoster`] / [`ToolRegistry`]: The workers and their capabilities.
//! - [`SupervisorConfig`]: Pipeline tunables.

/// Supervisor configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Static worker → tool → capability catalog.
pub mod registry;
/// Team roster.
pub mod roster;
/// Routing data model.
pub mod types;

pub use config::{SupervisorConfig, SynthesisKind};
pub use error::{ExecutionFault, OverseerError, OverseerResult, Phase, RunError};
pub use registry::{ToolRegistry, ToolSpec};
pub use roster::{TeamRoster, WorkerProfile};
pub use types::{
    Complexity, ExampleFingerprint, ExecutionMode, ExecutionResult, ExecutionSummary,
    HistoryEntry, ProgressAction, ProgressReport, QualityAssessment, RoutingDecision, RunStatus,
    TaskAnalysis, TrainingExample,
};
