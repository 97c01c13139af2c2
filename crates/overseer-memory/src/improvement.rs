use crate::examples::TrainingExampleStore;
use crate::history::{HistoryStats, HistoryStore};
use overseer_core::{HistoryEntry, OverseerResult, RunStatus, TrainingExample};
use overseer_router::ModuleCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Outcome class of a self-improvement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementStatus {
    /// New examples were added and the compiled module was marked stale.
    Improved,
    /// Qualifying runs existed but were all duplicates.
    NoNewExamples,
    /// No run in the window reached the quality bar.
    NoQualifyingRuns,
    /// The history is empty.
    EmptyHistory,
}

impl std::fmt::Display for ImprovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImprovementStatus::Improved => write!(f, "improved"),
            ImprovementStatus::NoNewExamples => write!(f, "no_new_examples"),
            ImprovementStatus::NoQualifyingRuns => write!(f, "no_qualifying_runs"),
            ImprovementStatus::EmptyHistory => write!(f, "empty_history"),
        }
    }
}

/// Result of [`SelfImprovementEngine::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementReport {
    /// New training examples written.
    pub examples_added: usize,
    /// Outcome of the pass.
    pub status: ImprovementStatus,
    /// Runs in the window that met the quality bar.
    pub qualifying_runs: usize,
    /// Statistics over the inspected window.
    pub stats: HistoryStats,
}

/// Harvests high-quality runs into training examples.
///
/// Never recompiles: it only marks the compiled module stale, and the next
/// routing call pays for the recompilation.
pub struct SelfImprovementEngine {
    history: Arc<dyn HistoryStore>,
    examples: Arc<TrainingExampleStore>,
    modules: Arc<ModuleCache>,
}

impl SelfImprovementEngine {
    /// Wire the engine to its stores.
    pub fn new(
        history: Arc<dyn HistoryStore>,
        examples: Arc<TrainingExampleStore>,
        modules: Arc<ModuleCache>,
    ) -> Self {
        Self {
            history,
            examples,
            modules,
        }
    }

    /// Scan the last `lookback` runs and append up to `max_examples` new
    /// training examples from completed runs scoring at least `min_quality`.
    pub async fn analyze(
        &self,
        min_quality: f32,
        max_examples: usize,
        lookback: usize,
    ) -> OverseerResult<ImprovementReport> {
        let window = self.history.recent(lookback).await?;
        let stats = HistoryStats::from_entries(&window);

        // Newest first, so the cap keeps the most recent runs.
        let candidates: Vec<TrainingExample> = window
            .iter()
            .rev()
            .filter_map(|entry| to_training_example(entry, min_quality))
            .collect();
        let qualifying_runs = candidates.len();

        let examples_added = if candidates.is_empty() {
            0
        } else {
            self.examples.append_unique(candidates, max_examples).await?
        };

        let status = if window.is_empty() {
            ImprovementStatus::EmptyHistory
        } else if qualifying_runs == 0 {
            ImprovementStatus::NoQualifyingRuns
        } else if examples_added == 0 {
            ImprovementStatus::NoNewExamples
        } else {
            ImprovementStatus::Improved
        };

        if examples_added > 0 {
            self.modules.invalidate().await?;
        }

        info!(
            inspected = window.len(),
            qualifying_runs,
            examples_added,
            status = %status,
            "Self-improvement pass finished"
        );

        Ok(ImprovementReport {
            examples_added,
            status,
            qualifying_runs,
            stats,
        })
    }
}

/// Training example for a finished, routed run that meets the quality bar.
///
/// Degraded runs count: only failed and cancelled runs are skipped.
pub fn to_training_example(entry: &HistoryEntry, min_quality: f32) -> Option<TrainingExample> {
    if !matches!(entry.status, RunStatus::Completed | RunStatus::Degraded) {
        return None;
    }
    let score = entry.quality_score()?;
    if score < min_quality {
        return None;
    }
    let routing = entry.routing.as_ref()?;
    Some(TrainingExample {
        task: entry.task.clone(),
        team: entry.team_description.clone(),
        tools: entry.tools_description.clone(),
        assigned_to: routing.assigned_workers.clone(),
        execution_mode: routing.execution_mode,
        tool_requirements: routing.tool_requirements.iter().cloned().collect(),
    })
}
