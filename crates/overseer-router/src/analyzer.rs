use overseer_agent::{AnalysisRequest, HeuristicReasoner, RawAnalysis, Reasoner};
use overseer_core::{Complexity, OverseerError, OverseerResult, TaskAnalysis, ToolRegistry};
use std::sync::Arc;
use tracing::{debug, warn};

/// Classifies tasks in the tool registry's capability vocabulary.
pub struct TaskAnalyzer {
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<ToolRegistry>,
    fallback: HeuristicReasoner,
}

impl TaskAnalyzer {
    /// Analyse with `reasoner`, in the vocabulary of `registry`.
    pub fn new(reasoner: Arc<dyn Reasoner>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            reasoner,
            registry,
            fallback: HeuristicReasoner::new(),
        }
    }

    /// Analyze a task.
    ///
    /// Fails only on empty or malformed task text. A reasoner failure falls
    /// back to the heuristic analysis; an undecided complexity becomes
    /// [`Complexity::Moderate`].
    pub async fn analyze(&self, task: &str, context: Option<&str>) -> OverseerResult<TaskAnalysis> {
        validate_task(task)?;

        let request = AnalysisRequest {
            task,
            context,
            registry: &self.registry,
        };
        let raw = match self.reasoner.analyze(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(reasoner = self.reasoner.name(), error = %e, "Analysis failed, using heuristic analysis");
                self.fallback.analyze(request).await.unwrap_or_default()
            }
        };

        let analysis = self.normalize(raw);
        debug!(summary = %analysis.summary(), "Task analyzed");
        Ok(analysis)
    }

    fn normalize(&self, raw: RawAnalysis) -> TaskAnalysis {
        let complexity = raw
            .complexity
            .as_deref()
            .and_then(|c| c.parse::<Complexity>().ok())
            .unwrap_or_default();

        let mut capabilities: Vec<String> = Vec::new();
        for cap in &raw.required_capabilities {
            match self.registry.canonical_capability(cap) {
                Some(canonical) if !capabilities.contains(&canonical) => capabilities.push(canonical),
                Some(_) => {}
                None => debug!(capability = %cap, "Dropping capability outside the registry vocabulary"),
            }
        }

        TaskAnalysis::new(complexity, capabilities, raw.estimated_steps.unwrap_or(1))
    }
}

/// Reject empty and malformed task text.
pub fn validate_task(task: &str) -> OverseerResult<()> {
    if task.trim().is_empty() {
        return Err(OverseerError::InvalidTask("task text is empty".into()));
    }
    if task.contains('\0') {
        return Err(OverseerError::InvalidTask("task text contains NUL bytes".into()));
    }
    Ok(())
}
