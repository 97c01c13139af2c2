use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Coarse complexity class of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// One step, one capability.
    Simple,
    /// The default when the signal is ambiguous.
    #[default]
    Moderate,
    /// Several dependent steps or many capabilities.
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "low" | "easy" => Ok(Complexity::Simple),
            "moderate" | "medium" => Ok(Complexity::Moderate),
            "complex" | "high" | "hard" => Ok(Complexity::Complex),
            other => Err(format!("unknown complexity: {other}")),
        }
    }
}

/// Result of the task analyzer. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// Complexity class.
    pub complexity: Complexity,
    /// Capabilities in the tool registry's vocabulary, in order of appearance.
    pub required_capabilities: Vec<String>,
    /// Estimated number of steps, always at least 1.
    pub estimated_steps: u32,
}

impl TaskAnalysis {
    /// Build an analysis, clamping `estimated_steps` to at least 1.
    pub fn new(complexity: Complexity, required_capabilities: Vec<String>, estimated_steps: u32) -> Self {
        Self {
            complexity,
            required_capabilities,
            estimated_steps: estimated_steps.max(1),
        }
    }

    /// One-line summary persisted into history.
    pub fn summary(&self) -> String {
        format!(
            "{} task, {} step(s), capabilities: [{}]",
            self.complexity,
            self.estimated_steps,
            self.required_capabilities.join(", ")
        )
    }
}

/// How the assigned workers cooperate on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A single worker handles the whole task.
    Delegated,
    /// Workers run in order, each seeing the previous output.
    Sequential,
    /// Workers run concurrently and their outputs are synthesised.
    Parallel,
}

impl ExecutionMode {
    /// Whether `worker_count` workers are a legal assignment for this mode.
    pub fn accepts_worker_count(&self, worker_count: usize) -> bool {
        match self {
            ExecutionMode::Delegated => worker_count == 1,
            ExecutionMode::Sequential | ExecutionMode::Parallel => worker_count >= 2,
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Delegated => write!(f, "delegated"),
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delegated" | "delegate" | "single" => Ok(ExecutionMode::Delegated),
            "sequential" | "sequence" | "chain" => Ok(ExecutionMode::Sequential),
            "parallel" | "concurrent" | "fan-out" | "fanout" => Ok(ExecutionMode::Parallel),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// The supervisor's choice of who works on a task and how.
///
/// Never mutated after creation: a changed decision is a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Assigned worker names. Order matters for sequential mode.
    pub assigned_workers: Vec<String>,
    /// Cooperation mode.
    pub execution_mode: ExecutionMode,
    /// Optional per-worker task strings, aligned with `assigned_workers`.
    #[serde(default)]
    pub subtasks: Option<Vec<String>>,
    /// Tool names the task needs.
    #[serde(default)]
    pub tool_requirements: BTreeSet<String>,
}

impl RoutingDecision {
    /// A single-worker decision.
    pub fn delegated(worker: impl Into<String>) -> Self {
        Self {
            assigned_workers: vec![worker.into()],
            execution_mode: ExecutionMode::Delegated,
            subtasks: None,
            tool_requirements: BTreeSet::new(),
        }
    }

    /// A multi-worker decision in the given mode.
    pub fn team(workers: Vec<String>, mode: ExecutionMode) -> Self {
        Self {
            assigned_workers: workers,
            execution_mode: mode,
            subtasks: None,
            tool_requirements: BTreeSet::new(),
        }
    }

    /// Attach per-worker subtasks.
    pub fn with_subtasks(mut self, subtasks: Vec<String>) -> Self {
        self.subtasks = Some(subtasks);
        self
    }

    /// Attach required tools.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_requirements = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Subtask for the worker at `index`, falling back to the shared task.
    pub fn subtask_for<'a>(&'a self, index: usize, task: &'a str) -> &'a str {
        self.subtasks
            .as_ref()
            .and_then(|s| s.get(index))
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(task)
    }
}

/// Output of the execution coordinator for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Per-worker output text.
    pub outputs: BTreeMap<String, String>,
    /// Combined output handed to evaluation.
    pub combined_output: String,
    /// Workers whose invocation failed, timed out or was skipped.
    pub failed_workers: Vec<String>,
    /// Duration per phase (`worker:<name>`, `synthesis`, ...) in milliseconds.
    pub phase_durations_ms: BTreeMap<String, u64>,
}

impl ExecutionResult {
    /// Whether some branch failed but a result was still produced.
    pub fn is_degraded(&self) -> bool {
        !self.failed_workers.is_empty()
    }

    /// Total time spent across all recorded phases.
    pub fn total_duration_ms(&self) -> u64 {
        self.phase_durations_ms.values().sum()
    }
}

/// Next step chosen by the progress evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressAction {
    /// Stop iterating and move to quality assessment.
    Complete,
    /// Run another iteration with the same routing decision.
    Continue,
    /// Re-route from scratch with the stall history as context.
    Replan,
}

/// Progress evaluator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Chosen action.
    pub action: ProgressAction,
    /// Guidance for the next iteration, or the reason for completion.
    pub feedback: String,
}

/// Quality assessor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Score on a fixed 0-10 scale.
    pub score: f32,
    /// Elements the output is missing.
    #[serde(default)]
    pub missing_elements: Vec<String>,
    /// Free-text improvement suggestions.
    #[serde(default)]
    pub improvement_suggestions: String,
    /// Whether another refinement round is warranted.
    pub refine: bool,
}

/// Final status of a run as recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run finished and every worker succeeded.
    Completed,
    /// The run finished with partial worker failures.
    Degraded,
    /// The run aborted.
    Failed,
    /// The caller cancelled the run.
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Degraded => write!(f, "degraded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What history keeps of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Mode that was executed.
    pub execution_mode: ExecutionMode,
    /// Workers that produced output.
    pub succeeded_workers: Vec<String>,
    /// Workers that failed.
    pub failed_workers: Vec<String>,
    /// Combined output of the final pass.
    pub combined_output: String,
    /// Duration per phase in milliseconds.
    pub phase_durations_ms: BTreeMap<String, u64>,
}

impl ExecutionSummary {
    /// Summarise an execution result for the given mode.
    pub fn from_result(mode: ExecutionMode, result: &ExecutionResult) -> Self {
        Self {
            execution_mode: mode,
            succeeded_workers: result.outputs.keys().cloned().collect(),
            failed_workers: result.failed_workers.clone(),
            combined_output: result.combined_output.clone(),
            phase_durations_ms: result.phase_durations_ms.clone(),
        }
    }
}

/// One line of the append-only run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Run identifier.
    pub id: Uuid,
    /// Task text as submitted.
    pub task: String,
    /// Final status.
    pub status: RunStatus,
    /// Roster description at the time of the run.
    #[serde(default)]
    pub team_description: String,
    /// Tool catalog description at the time of the run.
    #[serde(default)]
    pub tools_description: String,
    /// Task analysis, if the run got that far.
    pub analysis: Option<TaskAnalysis>,
    /// Routing decision, if one was made.
    pub routing: Option<RoutingDecision>,
    /// Execution summary, if any worker ran.
    pub execution: Option<ExecutionSummary>,
    /// Quality assessment, if the run reached it.
    pub quality: Option<QualityAssessment>,
    /// Refinement rounds actually performed.
    #[serde(default)]
    pub refinement_rounds: u32,
    /// Error text for failed or cancelled runs.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration of the whole run in milliseconds, stored as
    /// `total_duration`.
    #[serde(rename = "total_duration", alias = "total_duration_ms")]
    pub total_duration_ms: u64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Quality score, if assessed.
    pub fn quality_score(&self) -> Option<f32> {
        self.quality.as_ref().map(|q| q.score)
    }
}

/// Identity used to deduplicate training examples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExampleFingerprint {
    /// Normalised task text.
    pub task: String,
    /// Assigned workers in order.
    pub assigned_to: Vec<String>,
    /// Execution mode.
    pub execution_mode: ExecutionMode,
}

/// A labelled routing example used to tune the reasoning module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Task text.
    pub task: String,
    /// Team description the decision was made against.
    pub team: String,
    /// Available-tools description.
    pub tools: String,
    /// Workers the task was assigned to.
    pub assigned_to: Vec<String>,
    /// Execution mode that was used.
    pub execution_mode: ExecutionMode,
    /// Tools that were required.
    #[serde(default)]
    pub tool_requirements: Vec<String>,
}

impl TrainingExample {
    /// Deduplication key: `(task, assigned_to, execution_mode)`.
    pub fn fingerprint(&self) -> ExampleFingerprint {
        ExampleFingerprint {
            task: self.task.trim().to_lowercase(),
            assigned_to: self.assigned_to.clone(),
            execution_mode: self.execution_mode,
        }
    }

    /// The labelled decision this example encodes.
    pub fn expected_decision(&self) -> RoutingDecision {
        RoutingDecision::team(self.assigned_to.clone(), self.execution_mode)
            .with_tools(self.tool_requirements.iter().cloned())
    }
}
