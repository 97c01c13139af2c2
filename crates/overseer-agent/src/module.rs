use crate::text;
use chrono::{DateTime, Utc};
use overseer_core::{TeamRoster, TrainingExample};
use serde::{Deserialize, Serialize};

/// Version of the routing signature (inputs/outputs of the routing call).
///
/// Part of the compiled-module cache key: bump it whenever the request or
/// response schema of [`crate::Reasoner::route`] changes.
pub const SIGNATURE_VERSION: &str = "routing-signature/v1";

/// Minimum task similarity for a demonstration to be reused verbatim.
pub const DEMO_REUSE_THRESHOLD: f64 = 0.75;

/// A tuned routing module: instructions plus few-shot demonstrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModule {
    /// Optimizer that produced the module.
    pub optimizer: String,
    /// Hash of the inputs the module was compiled from.
    pub signature_hash: String,
    /// Routing instructions prepended to every routing call.
    pub instructions: String,
    /// Selected demonstrations.
    pub demos: Vec<TrainingExample>,
    /// Objective score on the training set, in `[0, 1]`.
    pub validation_score: f64,
    /// Compilation time.
    pub created_at: DateTime<Utc>,
}

/// Default routing instructions.
pub const BASE_INSTRUCTIONS: &str = "Assign the task to the fewest workers that cover every \
required capability. Use `delegated` for a single worker, `sequential` when later steps need \
earlier output, and `parallel` for independent parts. Only assign workers from the roster and \
only require tools an assigned worker has.";

impl CompiledModule {
    /// An uncompiled module: base instructions, no demonstrations.
    pub fn baseline(optimizer: impl Into<String>, signature_hash: impl Into<String>) -> Self {
        Self {
            optimizer: optimizer.into(),
            signature_hash: signature_hash.into(),
            instructions: BASE_INSTRUCTIONS.to_string(),
            demos: Vec::new(),
            validation_score: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Most similar demonstration whose workers all exist in `roster`.
    pub fn nearest_demo(&self, task: &str, roster: &TeamRoster) -> Option<(&TrainingExample, f64)> {
        self.demos
            .iter()
            .filter(|d| !d.assigned_to.is_empty() && d.assigned_to.iter().all(|w| roster.contains(w)))
            .map(|d| (d, text::similarity(task, &d.task)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Demonstrations rendered for a prompt.
    pub fn render_demos(&self) -> String {
        self.demos
            .iter()
            .map(|d| {
                format!(
                    "Task: {}\nAssigned: {}\nMode: {}\nTools: {}",
                    d.task,
                    d.assigned_to.join(", "),
                    d.execution_mode,
                    d.tool_requirements.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}
