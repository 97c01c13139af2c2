use crate::module::CompiledModule;
use async_trait::async_trait;
use overseer_core::{OverseerResult, TaskAnalysis, TeamRoster, ToolRegistry};
use serde::{Deserialize, Serialize};

/// Input of a task-analysis call.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// Task text.
    pub task: &'a str,
    /// Optional pre-fetched context.
    pub context: Option<&'a str>,
    /// Capability vocabulary to answer in.
    pub registry: &'a ToolRegistry,
}

/// Unvalidated analysis as produced by a reasoner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAnalysis {
    /// Complexity label; `None` when the reasoner could not decide.
    #[serde(default)]
    pub complexity: Option<String>,
    /// Capabilities in free form; normalised by the analyzer.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Estimated steps, if given.
    #[serde(default)]
    pub estimated_steps: Option<u32>,
}

/// Input of a routing call.
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest<'a> {
    /// Task text.
    pub task: &'a str,
    /// Analysis of the task.
    pub analysis: &'a TaskAnalysis,
    /// Workers available.
    pub roster: &'a TeamRoster,
    /// Tool catalog snapshot.
    pub registry: &'a ToolRegistry,
    /// Compiled routing module.
    pub module: &'a CompiledModule,
    /// Corrective feedback from a rejected previous attempt or a stall.
    pub feedback: Option<&'a str>,
}

/// Unvalidated routing decision as produced by a reasoner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRoutingDecision {
    /// Assigned workers, in order.
    #[serde(default)]
    pub assigned_workers: Vec<String>,
    /// Mode label; `None` when the reasoner is ambiguous.
    #[serde(default)]
    pub execution_mode: Option<String>,
    /// Per-worker subtasks.
    #[serde(default)]
    pub subtasks: Option<Vec<String>>,
    /// Required tool names.
    #[serde(default)]
    pub tool_requirements: Vec<String>,
    /// Whether the subtasks depend on each other in the given order.
    #[serde(default)]
    pub ordered: bool,
}

/// Input of a progress judgement.
#[derive(Debug, Clone, Copy)]
pub struct ProgressRequest<'a> {
    /// Task text.
    pub task: &'a str,
    /// Combined output of the latest iteration.
    pub output: &'a str,
    /// Combined output of the iteration before, if any.
    pub previous_output: Option<&'a str>,
    /// Workers that failed in the latest iteration.
    pub failed_workers: &'a [String],
    /// Iterations left after this one.
    pub remaining_iterations: u32,
}

/// A reasoner's view on whether the task is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressJudgement {
    /// The output answers the task.
    pub complete: bool,
    /// The latest iteration moved the output forward.
    pub made_progress: bool,
    /// Guidance for the next iteration.
    #[serde(default)]
    pub feedback: String,
}

/// Input of a quality assessment.
#[derive(Debug, Clone, Copy)]
pub struct QualityRequest<'a> {
    /// Task text.
    pub task: &'a str,
    /// Output to score.
    pub output: &'a str,
}

/// A reasoner's raw quality verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityJudgement {
    /// Score on the 0-10 scale; clamped by the assessor.
    pub score: f32,
    /// Missing elements.
    #[serde(default)]
    pub missing_elements: Vec<String>,
    /// Improvement suggestions.
    #[serde(default)]
    pub improvement_suggestions: String,
}

/// The reasoning module behind the supervisor's decisions.
///
/// Implementations may call an LLM or be fully local. Each method is a
/// suspension point; none of them may mutate supervisor state.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Classify a task.
    async fn analyze(&self, request: AnalysisRequest<'_>) -> OverseerResult<RawAnalysis>;

    /// Propose a routing decision.
    async fn route(&self, request: RoutingRequest<'_>) -> OverseerResult<RawRoutingDecision>;

    /// Judge whether the latest iteration completed the task.
    async fn judge_progress(&self, request: ProgressRequest<'_>) -> OverseerResult<ProgressJudgement>;

    /// Score an output.
    async fn assess_quality(&self, request: QualityRequest<'_>) -> OverseerResult<QualityJudgement>;
}
