use crate::analyzer::TaskAnalyzer;
use async_trait::async_trait;
use chrono::Utc;
use overseer_agent::{CompiledModule, Reasoner, RoutingRequest};
use overseer_core::{
    ExecutionMode, OverseerError, OverseerResult, RoutingDecision, TeamRoster, ToolRegistry,
    TrainingExample,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Upper bound on examples used to score a module.
const VALIDATION_LIMIT: usize = 32;

/// Where a compiler reads the current training-example set from.
#[async_trait]
pub trait TrainingSource: Send + Sync {
    /// Load every training example, oldest first.
    async fn load(&self) -> OverseerResult<Vec<TrainingExample>>;
}

/// A fixed in-memory training set.
#[derive(Debug, Clone, Default)]
pub struct StaticTraining(pub Vec<TrainingExample>);

#[async_trait]
impl TrainingSource for StaticTraining {
    async fn load(&self) -> OverseerResult<Vec<TrainingExample>> {
        Ok(self.0.clone())
    }
}

/// Black-box optimizer that turns training examples into a routing module.
#[async_trait]
pub trait ModuleCompiler: Send + Sync {
    /// Optimizer identifier, part of the module cache key.
    fn name(&self) -> &str;

    /// Compile a module from `examples`.
    async fn compile(
        &self,
        examples: &[TrainingExample],
        signature_hash: &str,
    ) -> OverseerResult<CompiledModule>;
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    inter / union
}

/// Objective used to score routing modules, in `[0, 1]`.
///
/// Workers weigh 0.5 (exact order scores full, otherwise set overlap),
/// mode 0.3 and tool requirements 0.2.
pub fn routing_metric(expected: &RoutingDecision, actual: &RoutingDecision) -> f64 {
    let workers = if expected.assigned_workers == actual.assigned_workers {
        1.0
    } else {
        let a: BTreeSet<&String> = expected.assigned_workers.iter().collect();
        let b: BTreeSet<&String> = actual.assigned_workers.iter().collect();
        jaccard(&a, &b)
    };
    let mode = if expected.execution_mode == actual.execution_mode {
        1.0
    } else {
        0.0
    };
    let tools = jaccard(&expected.tool_requirements, &actual.tool_requirements);
    0.5 * workers + 0.3 * mode + 0.2 * tools
}

/// Most recent examples with distinct fingerprints, oldest first.
fn distinct_recent(examples: &[TrainingExample]) -> Vec<&TrainingExample> {
    let mut seen = HashSet::new();
    let mut out: Vec<&TrainingExample> = examples
        .iter()
        .rev()
        .filter(|e| !e.assigned_to.is_empty() && seen.insert(e.fingerprint()))
        .collect();
    out.reverse();
    out
}

/// Routes training tasks against the live team to score candidate modules.
struct Evaluator {
    reasoner: Arc<dyn Reasoner>,
    analyzer: TaskAnalyzer,
    roster: Arc<TeamRoster>,
    registry: Arc<ToolRegistry>,
}

impl Evaluator {
    fn new(reasoner: Arc<dyn Reasoner>, roster: Arc<TeamRoster>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            analyzer: TaskAnalyzer::new(Arc::clone(&reasoner), Arc::clone(&registry)),
            reasoner,
            roster,
            registry,
        }
    }

    fn applicable(&self, example: &TrainingExample) -> bool {
        example.assigned_to.iter().all(|w| self.roster.contains(w))
    }

    /// Metric of `module` on `example`; 0 when the reasoner fails or answers
    /// with an unusable decision.
    async fn score(&self, module: &CompiledModule, example: &TrainingExample) -> f64 {
        let Ok(analysis) = self.analyzer.analyze(&example.task, None).await else {
            return 0.0;
        };
        let request = RoutingRequest {
            task: &example.task,
            analysis: &analysis,
            roster: &self.roster,
            registry: &self.registry,
            module,
            feedback: None,
        };
        let Ok(raw) = self.reasoner.route(request).await else {
            return 0.0;
        };
        let Some(mode) = raw
            .execution_mode
            .as_deref()
            .and_then(|m| m.parse::<ExecutionMode>().ok())
        else {
            return 0.0;
        };
        let actual =
            RoutingDecision::team(raw.assigned_workers, mode).with_tools(raw.tool_requirements);
        routing_metric(&example.expected_decision(), &actual)
    }

    /// Leave-one-out score of a module over the most recent applicable
    /// examples: each example is scored with itself removed from the demos.
    async fn leave_one_out(&self, module: &CompiledModule, examples: &[&TrainingExample]) -> f64 {
        let held_out: Vec<&TrainingExample> = examples
            .iter()
            .rev()
            .filter(|e| self.applicable(e))
            .take(VALIDATION_LIMIT)
            .copied()
            .collect();
        if held_out.is_empty() {
            return 0.0;
        }

        let mut total = 0.0;
        for example in &held_out {
            let mut reduced = module.clone();
            let fingerprint = example.fingerprint();
            reduced.demos.retain(|d| d.fingerprint() != fingerprint);
            total += self.score(&reduced, example).await;
        }
        total / held_out.len() as f64
    }
}

/// Uses the `max_demos` most recent distinct examples as demonstrations.
pub struct LabeledFewShot {
    max_demos: usize,
    evaluator: Evaluator,
}

impl LabeledFewShot {
    /// Keep at most `max_demos` demonstrations, scored with `reasoner` on this team.
    pub fn new(
        max_demos: usize,
        reasoner: Arc<dyn Reasoner>,
        roster: Arc<TeamRoster>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            max_demos,
            evaluator: Evaluator::new(reasoner, roster, registry),
        }
    }
}

#[async_trait]
impl ModuleCompiler for LabeledFewShot {
    fn name(&self) -> &str {
        "labeled_fewshot"
    }

    async fn compile(
        &self,
        examples: &[TrainingExample],
        signature_hash: &str,
    ) -> OverseerResult<CompiledModule> {
        let candidates = distinct_recent(examples);
        let skip = candidates.len().saturating_sub(self.max_demos);
        let mut module = CompiledModule::baseline(self.name(), signature_hash);
        module.demos = candidates[skip..].iter().map(|e| (*e).clone()).collect();
        module.validation_score = self.evaluator.leave_one_out(&module, &candidates).await;
        module.created_at = Utc::now();
        Ok(module)
    }
}

/// Bootstraps demonstrations from the examples the unaided reasoner gets
/// wrong, then fills the remaining slots with the most recent examples.
pub struct BootstrapFewShot {
    max_demos: usize,
    evaluator: Evaluator,
}

impl BootstrapFewShot {
    /// Keep at most `max_demos` demonstrations, scored with `reasoner` on this team.
    pub fn new(
        max_demos: usize,
        reasoner: Arc<dyn Reasoner>,
        roster: Arc<TeamRoster>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            max_demos,
            evaluator: Evaluator::new(reasoner, roster, registry),
        }
    }
}

#[async_trait]
impl ModuleCompiler for BootstrapFewShot {
    fn name(&self) -> &str {
        "bootstrap_fewshot"
    }

    async fn compile(
        &self,
        examples: &[TrainingExample],
        signature_hash: &str,
    ) -> OverseerResult<CompiledModule> {
        let candidates = distinct_recent(examples);
        let baseline = CompiledModule::baseline(self.name(), signature_hash);

        let mut hard = Vec::new();
        let mut easy = Vec::new();
        for example in candidates.iter().rev() {
            if !self.evaluator.applicable(example) {
                easy.push(*example);
                continue;
            }
            let score = self.evaluator.score(&baseline, example).await;
            if score < 1.0 {
                hard.push(*example);
            } else {
                easy.push(*example);
            }
        }
        debug!(hard = hard.len(), easy = easy.len(), "Bootstrapped demonstration pool");

        let mut demos: Vec<TrainingExample> = hard
            .into_iter()
            .chain(easy)
            .take(self.max_demos)
            .cloned()
            .collect();
        demos.reverse();

        let mut module = baseline;
        module.demos = demos;
        module.validation_score = self.evaluator.leave_one_out(&module, &candidates).await;
        module.created_at = Utc::now();
        Ok(module)
    }
}

/// Build the compiler named by `optimizer`.
pub fn compiler_for(
    optimizer: &str,
    max_demos: usize,
    reasoner: Arc<dyn Reasoner>,
    roster: Arc<TeamRoster>,
    registry: Arc<ToolRegistry>,
) -> OverseerResult<Arc<dyn ModuleCompiler>> {
    match optimizer {
        "labeled_fewshot" => Ok(Arc::new(LabeledFewShot::new(max_demos, reasoner, roster, registry))),
        "bootstrap_fewshot" => Ok(Arc::new(BootstrapFewShot::new(
            max_demos, reasoner, roster, registry,
        ))),
        other => Err(OverseerError::Config(format!("unknown optimizer: {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use overseer_agent::HeuristicReasoner;
    use overseer_core::WorkerProfile;

    fn example(task: &str, workers: &[&str], mode: ExecutionMode) -> TrainingExample {
        TrainingExample {
            task: task.into(),
            team: String::new(),
            tools: String::new(),
            assigned_to: workers.iter().map(|w| (*w).to_string()).collect(),
            execution_mode: mode,
            tool_requirements: vec![],
        }
    }

    fn team() -> (Arc<TeamRoster>, Arc<ToolRegistry>) {
        let roster = TeamRoster::new(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ]);
        let registry = ToolRegistry::from_roster(&roster, vec![]);
        (Arc::new(roster), Arc::new(registry))
    }

    #[test]
    fn test_routing_metric_weights() {
        let expected = RoutingDecision::team(vec!["A".into(), "B".into()], ExecutionMode::Sequential)
            .with_tools(["web_search"]);
        assert_eq!(routing_metric(&expected, &expected), 1.0);

        let swapped = RoutingDecision::team(vec!["B".into(), "A".into()], ExecutionMode::Parallel);
        let score = routing_metric(&expected, &swapped);
        assert!((score - 0.5).abs() < 1e-9, "score was {score}");

        let wrong = RoutingDecision::delegated("C");
        assert_eq!(routing_metric(&expected, &wrong), 0.0);
    }

    #[test]
    fn test_distinct_recent_keeps_latest_duplicate() {
        let examples = vec![
            example("Task", &["A"], ExecutionMode::Delegated),
            example("other", &["B"], ExecutionMode::Delegated),
            example("task ", &["A"], ExecutionMode::Delegated),
            example("unassigned", &[], ExecutionMode::Delegated),
        ];
        let distinct = distinct_recent(&examples);
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].task, "other");
        assert_eq!(distinct[1].task, "task ");
    }

    #[tokio::test]
    async fn test_labeled_fewshot_takes_most_recent() {
        let (roster, registry) = team();
        let compiler = LabeledFewShot::new(2, Arc::new(HeuristicReasoner::new()), roster, registry);
        let examples = vec![
            example("first", &["Writer"], ExecutionMode::Delegated),
            example("second", &["Writer"], ExecutionMode::Delegated),
            example("third", &["Researcher"], ExecutionMode::Delegated),
        ];
        let module = compiler.compile(&examples, "hash").await.unwrap();
        let tasks: Vec<&str> = module.demos.iter().map(|d| d.task.as_str()).collect();
        assert_eq!(tasks, vec!["second", "third"]);
        assert_eq!(module.optimizer, "labeled_fewshot");
        assert_eq!(module.signature_hash, "hash");
    }

    #[tokio::test]
    async fn test_bootstrap_prefers_examples_the_reasoner_misses() {
        let (roster, registry) = team();
        let compiler = BootstrapFewShot::new(1, Arc::new(HeuristicReasoner::new()), roster, registry);
        let examples = vec![
            // Nothing in the text points at the Writer; the heuristic falls back to Researcher.
            example("prepare the quarterly brief", &["Writer"], ExecutionMode::Delegated),
            // Routed correctly without help, and more recent.
            example("write a poem", &["Writer"], ExecutionMode::Delegated),
        ];
        let module = compiler.compile(&examples, "hash").await.unwrap();
        assert_eq!(module.demos.len(), 1);
        assert_eq!(module.demos[0].task, "prepare the quarterly brief");
        assert!(module.validation_score > 0.0 && module.validation_score <= 1.0);
    }

    #[tokio::test]
    async fn test_empty_training_set_compiles_baseline() {
        let (roster, registry) = team();
        let compiler = BootstrapFewShot::new(4, Arc::new(HeuristicReasoner::new()), roster, registry);
        let module = compiler.compile(&[], "hash").await.unwrap();
        assert!(module.demos.is_empty());
        assert_eq!(module.validation_score, 0.0);
    }

    #[test]
    fn test_compiler_for_unknown_optimizer() {
        let (roster, registry) = team();
        let reasoner: Arc<dyn Reasoner> = Arc::new(HeuristicReasoner::new());
        assert!(compiler_for("mipro", 4, Arc::clone(&reasoner), Arc::clone(&roster), Arc::clone(&registry)).is_err());
        assert_eq!(
            compiler_for("labeled_fewshot", 4, reasoner, roster, registry)
                .unwrap()
                .name(),
            "labeled_fewshot"
        );
    }
}
