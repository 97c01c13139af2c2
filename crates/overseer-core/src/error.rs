use crate::types::RoutingDecision;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A convenience `Result` alias using [`OverseerError`].
pub type OverseerResult<T> = Result<T, OverseerError>;

/// A fault reported by the worker execution runtime for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFault {
    /// The worker ran and reported a failure.
    #[error("worker '{worker}' failed: {message}")]
    Failed {
        /// Name of the failing worker.
        worker: String,
        /// Failure description from the runtime.
        message: String,
    },

    /// The worker did not answer within the allotted time.
    #[error("worker '{worker}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the worker that timed out.
        worker: String,
        /// Time budget that was exceeded.
        elapsed: Duration,
    },

    /// The invocation was never started because the run was cancelled.
    #[error("worker '{worker}' was not started: run cancelled")]
    Cancelled {
        /// Name of the worker that was skipped.
        worker: String,
    },
}

impl ExecutionFault {
    /// Shorthand for [`ExecutionFault::Failed`].
    pub fn failed(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Name of the worker this fault belongs to.
    pub fn worker(&self) -> &str {
        match self {
            Self::Failed { worker, .. } | Self::Timeout { worker, .. } | Self::Cancelled { worker } => {
                worker
            }
        }
    }
}

/// Top-level error type for the Overseer supervisor.
///
/// Only [`OverseerError::InvalidTask`], an exhausted [`OverseerError::Routing`]
/// and a terminal [`OverseerError::AgentExecution`] abort a run. Everything
/// else is degraded by the component that observes it.
#[derive(Debug, thiserror::Error)]
pub enum OverseerError {
    /// Malformed or empty task text. Never retried.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// The router could not produce a decision satisfying the routing invariants.
    #[error("Routing error: {message}")]
    Routing {
        /// Description of the last invariant violation.
        message: String,
        /// The last decision the reasoner produced, kept for diagnostics.
        last_decision: Option<Box<RoutingDecision>>,
    },

    /// A worker failure that the current execution mode cannot absorb.
    #[error("Agent execution error ({worker}): {message}")]
    AgentExecution {
        /// Worker whose failure was fatal.
        worker: String,
        /// Failure description.
        message: String,
    },

    /// A single worker invocation fault.
    #[error(transparent)]
    Execution(#[from] ExecutionFault),

    /// The reasoning module could not be (re)compiled.
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// History persistence failed.
    #[error("History error: {0}")]
    History(String),

    /// The run was cancelled by the caller.
    #[error("Run cancelled during {0}")]
    Cancelled(Phase),

    /// The reasoning backend returned an error or an unusable answer.
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverseerError {
    /// Whether this error aborts a run rather than degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTask(_)
                | Self::Routing { .. }
                | Self::AgentExecution { .. }
                | Self::Cancelled(_)
        )
    }
}

/// Pipeline phase, used to report where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Task analysis.
    Analysis,
    /// Routing decision synthesis.
    Routing,
    /// Worker execution.
    Execution,
    /// Progress evaluation.
    Evaluation,
    /// Quality assessment and refinement.
    Assessment,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Analysis => write!(f, "analysis"),
            Phase::Routing => write!(f, "routing"),
            Phase::Execution => write!(f, "execution"),
            Phase::Evaluation => write!(f, "evaluation"),
            Phase::Assessment => write!(f, "assessment"),
        }
    }
}

/// Failure of a whole `run()`: which phase failed, why, and the best partial output.
#[derive(Debug, thiserror::Error)]
#[error("run failed during {phase}: {source}")]
pub struct RunError {
    /// Phase in which the run stopped.
    pub phase: Phase,
    /// Underlying cause.
    #[source]
    pub source: OverseerError,
    /// Best partial result available when the run stopped.
    pub partial_output: Option<String>,
}

impl RunError {
    /// Build a run error without a partial result.
    pub fn new(phase: Phase, source: OverseerError) -> Self {
        Self {
            phase,
            source,
            partial_output: None,
        }
    }

    /// Attach the best partial result.
    pub fn with_partial(mut self, partial: Option<String>) -> Self {
        self.partial_output = partial;
        self
    }
}
