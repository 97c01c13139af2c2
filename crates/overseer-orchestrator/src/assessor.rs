use overseer_agent::{QualityRequest, Reasoner};
use overseer_core::QualityAssessment;
use std::sync::Arc;
use tracing::warn;

/// Scores outputs on the 0-10 scale and decides whether to refine.
pub struct QualityAssessor {
    reasoner: Arc<dyn Reasoner>,
    threshold: f32,
    max_rounds: u32,
}

impl QualityAssessor {
    /// Refine below `threshold`, at most `max_rounds` times per run.
    pub fn new(reasoner: Arc<dyn Reasoner>, threshold: f32, max_rounds: u32) -> Self {
        Self {
            reasoner,
            threshold,
            max_rounds,
        }
    }

    /// Refinement budget per run.
    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    /// Score `output`. `rounds_done` is the number of refinement rounds
    /// already spent on this run.
    ///
    /// A reasoner failure yields score 0 without refinement.
    pub async fn assess(&self, task: &str, output: &str, rounds_done: u32) -> QualityAssessment {
        match self
            .reasoner
            .assess_quality(QualityRequest { task, output })
            .await
        {
            Ok(judgement) => {
                let score = clamp_score(judgement.score);
                QualityAssessment {
                    score,
                    refine: score < self.threshold && rounds_done < self.max_rounds,
                    missing_elements: judgement.missing_elements,
                    improvement_suggestions: judgement.improvement_suggestions,
                }
            }
            Err(e) => {
                warn!(error = %e, "Quality assessment failed, scoring 0");
                QualityAssessment {
                    score: 0.0,
                    missing_elements: Vec::new(),
                    improvement_suggestions: format!("quality assessment unavailable: {e}"),
                    refine: false,
                }
            }
        }
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 10.0)
    }
}

/// Corrective instruction for a refinement round.
pub fn refinement_instruction(assessment: &QualityAssessment) -> String {
    let mut lines = Vec::new();
    if !assessment.missing_elements.is_empty() {
        lines.push(format!(
            "The previous answer is missing: {}.",
            assessment.missing_elements.join(", ")
        ));
    }
    if !assessment.improvement_suggestions.trim().is_empty() {
        lines.push(assessment.improvement_suggestions.trim().to_string());
    }
    if lines.is_empty() {
        lines.push("Improve the completeness and accuracy of the previous answer.".to_string());
    }
    lines.join("\n")
}
