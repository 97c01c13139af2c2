use crate::error::{OverseerError, OverseerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How parallel branch outputs are merged into one text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisKind {
    /// Concatenate the branch outputs under per-worker headings.
    #[default]
    Concatenate,
    /// Concatenate, then ask a worker to re-summarise the result.
    Summarize,
}

/// Tunables of the supervisor pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Routing cache time-to-live in seconds.
    #[serde(default = "default_routing_cache_ttl_secs")]
    pub routing_cache_ttl_secs: u64,
    /// Maximum routing cache entries.
    #[serde(default = "default_routing_cache_capacity")]
    pub routing_cache_capacity: usize,
    /// Reasoning attempts the router may spend on invalid decisions.
    #[serde(default = "default_backtrack_budget")]
    pub backtrack_budget: u32,
    /// Maximum execute/evaluate iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Stalls tolerated before a replan.
    #[serde(default = "default_max_stalls")]
    pub max_stalls: u32,
    /// Replans tolerated before completion is forced.
    #[serde(default = "default_max_resets")]
    pub max_resets: u32,
    /// Scores below this trigger refinement.
    #[serde(default = "default_refinement_threshold")]
    pub refinement_threshold: f32,
    /// Maximum refinement rounds per run.
    #[serde(default = "default_max_refinement_rounds")]
    pub max_refinement_rounds: u32,
    /// Per-worker invocation timeout in seconds.
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    /// Minimum quality for a run to become a training example.
    #[serde(default = "default_min_quality")]
    pub min_quality: f32,
    /// Maximum training examples added per self-improvement pass.
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
    /// History entries scanned per self-improvement pass.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Optimizer used to compile the routing module.
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
    /// Demonstrations kept in a compiled module.
    #[serde(default = "default_max_demos")]
    pub max_demos: usize,
    /// Parallel-mode synthesis strategy.
    #[serde(default)]
    pub synthesis: SynthesisKind,
    /// Worker used for `summarize` synthesis. Defaults to the last assigned worker.
    #[serde(default)]
    pub summarizer: Option<String>,
}

fn default_routing_cache_ttl_secs() -> u64 {
    300
}
fn default_routing_cache_capacity() -> usize {
    256
}
fn default_backtrack_budget() -> u32 {
    3
}
fn default_max_iterations() -> u32 {
    3
}
fn default_max_stalls() -> u32 {
    2
}
fn default_max_resets() -> u32 {
    1
}
fn default_refinement_threshold() -> f32 {
    8.0
}
fn default_max_refinement_rounds() -> u32 {
    1
}
fn default_worker_timeout_secs() -> u64 {
    300
}
fn default_min_quality() -> f32 {
    8.0
}
fn default_max_examples() -> usize {
    20
}
fn default_lookback() -> usize {
    100
}
fn default_optimizer() -> String {
    "bootstrap_fewshot".to_string()
}
fn default_max_demos() -> usize {
    8
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            routing_cache_ttl_secs: default_routing_cache_ttl_secs(),
            routing_cache_capacity: default_routing_cache_capacity(),
            backtrack_budget: default_backtrack_budget(),
            max_iterations: default_max_iterations(),
            max_stalls: default_max_stalls(),
            max_resets: default_max_resets(),
            refinement_threshold: default_refinement_threshold(),
            max_refinement_rounds: default_max_refinement_rounds(),
            worker_timeout_secs: default_worker_timeout_secs(),
            min_quality: default_min_quality(),
            max_examples: default_max_examples(),
            lookback: default_lookback(),
            optimizer: default_optimizer(),
            max_demos: default_max_demos(),
            synthesis: SynthesisKind::default(),
            summarizer: None,
        }
    }
}

impl SupervisorConfig {
    /// Routing cache TTL as a duration.
    pub fn routing_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.routing_cache_ttl_secs)
    }

    /// Worker timeout as a duration.
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> OverseerResult<()> {
        if self.routing_cache_capacity == 0 {
            return Err(OverseerError::Config(
                "routing_cache_capacity must be at least 1".into(),
            ));
        }
        if self.backtrack_budget == 0 {
            return Err(OverseerError::Config(
                "backtrack_budget must be at least 1".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(OverseerError::Config(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=10.0).contains(&self.refinement_threshold) {
            return Err(OverseerError::Config(format!(
                "refinement_threshold must be within 0-10, got {}",
                self.refinement_threshold
            )));
        }
        if !(0.0..=10.0).contains(&self.min_quality) {
            return Err(OverseerError::Config(format!(
                "min_quality must be within 0-10, got {}",
                self.min_quality
            )));
        }
        if self.worker_timeout_secs == 0 {
            return Err(OverseerError::Config(
                "worker_timeout_secs must be at least 1".into(),
            ));
        }
        if self.optimizer.trim().is_empty() {
            return Err(OverseerError::Config("optimizer must not be empty".into()));
        }
        Ok(())
    }
}
