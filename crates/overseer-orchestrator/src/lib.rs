//! Pipeline orchestration for the Overseer supervisor.
//!
//! [`Supervisor`] runs a task through analysis, routing, execution
//! ([`ExecutionCoordinator`]), progress evaluation ([`ProgressEvaluator`])
//! and quality assessment ([`QualityAssessor`]), then records it in history.
//! Worker activity is tracked by the [`WorkerMonitor`].

/// Quality assessment.
pub mod assessor;
/// Execution-mode dispatch.
pub mod coordinator;
/// Progress evaluation.
pub mod evaluator;
/// Worker monitoring.
pub mod monitor;
/// The run pipeline.
pub mod supervisor;
/// Parallel output synthesis.
pub mod synthesis;

pub use assessor::{refinement_instruction, QualityAssessor};
pub use coordinator::{with_instruction, ExecutionCoordinator};
pub use evaluator::ProgressEvaluator;
pub use monitor::{InvocationOutcome, WorkerMetrics, WorkerMonitor, WorkerState, WorkerStatus};
pub use supervisor::{RunOutcome, Storage, Supervisor, SupervisorStats};
pub use synthesis::{concatenate, synthesizer_for, BranchOutput, Concatenate, Summarize, Synthesizer};
