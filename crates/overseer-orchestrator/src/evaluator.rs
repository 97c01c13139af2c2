use overseer_agent::{ProgressRequest, Reasoner};
use overseer_core::{ExecutionResult, ProgressAction, ProgressReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decides after each execution whether to stop, iterate or re-route.
///
/// One evaluator lives for one run. An iteration without progress is a
/// stall; `max_stalls` stalls force a replan and the counter restarts.
/// Once `max_resets` replans have been spent the evaluator completes the
/// run whatever the quality.
pub struct ProgressEvaluator {
    reasoner: Arc<dyn Reasoner>,
    max_stalls: u32,
    max_resets: u32,
    stalls: u32,
    resets: u32,
    stall_history: Vec<String>,
}

impl ProgressEvaluator {
    /// A fresh evaluator for one run.
    pub fn new(reasoner: Arc<dyn Reasoner>, max_stalls: u32, max_resets: u32) -> Self {
        Self {
            reasoner,
            max_stalls,
            max_resets,
            stalls: 0,
            resets: 0,
            stall_history: Vec::new(),
        }
    }

    /// Stalls since the last replan.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    /// Replans issued so far.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Judge the latest execution.
    pub async fn evaluate(
        &mut self,
        task: &str,
        result: &ExecutionResult,
        previous_output: Option<&str>,
        remaining_iterations: u32,
    ) -> ProgressReport {
        let request = ProgressRequest {
            task,
            output: &result.combined_output,
            previous_output,
            failed_workers: &result.failed_workers,
            remaining_iterations,
        };
        let judgement = match self.reasoner.judge_progress(request).await {
            Ok(judgement) => judgement,
            Err(e) => {
                warn!(error = %e, "Progress evaluation failed, completing run");
                return complete(format!("progress evaluation unavailable: {e}"));
            }
        };

        if judgement.complete {
            return complete(judgement.feedback);
        }
        if remaining_iterations == 0 {
            debug!("Iteration budget exhausted");
            return complete(format!("iteration budget exhausted: {}", judgement.feedback));
        }

        if judgement.made_progress {
            self.stalls = self.stalls.saturating_sub(1);
            return ProgressReport {
                action: ProgressAction::Continue,
                feedback: judgement.feedback,
            };
        }

        self.stalls += 1;
        self.stall_history.push(judgement.feedback.clone());
        if self.stalls < self.max_stalls {
            return ProgressReport {
                action: ProgressAction::Continue,
                feedback: judgement.feedback,
            };
        }

        if self.resets >= self.max_resets {
            info!(resets = self.resets, "Replan budget exhausted, completing run");
            return complete(format!("replan budget exhausted: {}", judgement.feedback));
        }

        self.resets += 1;
        self.stalls = 0;
        let feedback = format!(
            "The previous plan stalled {} time(s):\n- {}",
            self.stall_history.len(),
            self.stall_history.join("\n- ")
        );
        info!(resets = self.resets, "Progress stalled, replanning");
        ProgressReport {
            action: ProgressAction::Replan,
            feedback,
        }
    }
}

fn complete(feedback: String) -> ProgressReport {
    ProgressReport {
        action: ProgressAction::Complete,
        feedback,
    }
}
