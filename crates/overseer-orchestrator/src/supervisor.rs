use crate::assessor::{refinement_instruction, QualityAssessor};
use crate::coordinator::ExecutionCoordinator;
use crate::evaluator::ProgressEvaluator;
use crate::monitor::{WorkerMetrics, WorkerMonitor, WorkerState};
use crate::synthesis::synthesizer_for;
use chrono::Utc;
use overseer_agent::{text, Reasoner, WorkerRuntime};
use overseer_core::{
    ExecutionResult, ExecutionSummary, HistoryEntry, OverseerError, OverseerResult, Phase,
    ProgressAction, QualityAssessment, RoutingDecision, RunError, RunStatus, SupervisorConfig,
    TaskAnalysis, TeamRoster, ToolRegistry,
};
use overseer_memory::{
    HistoryStats, HistoryStore, ImprovementReport, JsonlHistoryStore, SelfImprovementEngine,
    TrainingExampleStore,
};
use overseer_router::{
    compiler_for, validate_task, ModuleCache, ModuleState, Router, RoutingCache, TaskAnalyzer,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const HISTORY_FILE: &str = "history.jsonl";
const EXAMPLES_FILE: &str = "training_examples.json";
const MODULES_DIR: &str = "modules";

/// Persistent state shared by a supervisor and its improvement loop.
pub struct Storage {
    /// Run history.
    pub history: Arc<dyn HistoryStore>,
    /// Routing training set.
    pub examples: Arc<TrainingExampleStore>,
    /// Compiled routing module cache.
    pub modules: Arc<ModuleCache>,
}

impl Storage {
    /// Open (or create) the standard layout under `data_dir`.
    pub async fn open(data_dir: impl AsRef<Path>) -> OverseerResult<Self> {
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            history: Arc::new(JsonlHistoryStore::new(dir.join(HISTORY_FILE)).await?),
            examples: Arc::new(TrainingExampleStore::new(dir.join(EXAMPLES_FILE))),
            modules: Arc::new(ModuleCache::new(dir.join(MODULES_DIR))),
        })
    }
}

/// Successful result of [`Supervisor::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Run identifier, as in history.
    pub id: Uuid,
    /// Final combined output.
    pub result: String,
    /// Routing decision of the final plan.
    pub routing: RoutingDecision,
    /// Task analysis.
    pub analysis: TaskAnalysis,
    /// Assessment of the final output.
    pub quality: QualityAssessment,
    /// `Completed`, or `Degraded` when some worker failed along the way.
    pub status: RunStatus,
    /// Execution that produced the final output.
    pub execution: ExecutionResult,
    /// Execute/evaluate iterations performed.
    pub iterations: u32,
    /// Replans performed.
    pub replans: u32,
    /// Refinement rounds performed.
    pub refinement_rounds: u32,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// Snapshot for management surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorStats {
    /// Statistics over the lookback window.
    pub history: HistoryStats,
    /// Per-worker state, sorted by name.
    pub workers: Vec<WorkerState>,
    /// Metrics summed over all workers.
    pub aggregate: WorkerMetrics,
    /// Cached routing decisions.
    pub routing_cache_entries: usize,
    /// State of the compiled routing module.
    pub module_state: ModuleState,
}

/// What a run accumulated so far; persisted whatever the outcome.
#[derive(Default)]
struct RunTrace {
    analysis: Option<TaskAnalysis>,
    routing: Option<Arc<RoutingDecision>>,
    execution: Option<ExecutionResult>,
    quality: Option<QualityAssessment>,
    iterations: u32,
    replans: u32,
    refinement_rounds: u32,
}

impl RunTrace {
    fn partial_output(&self) -> Option<String> {
        self.execution
            .as_ref()
            .map(|e| e.combined_output.clone())
            .filter(|o| !o.trim().is_empty())
    }
}

fn check_cancel(cancel: &CancellationToken, phase: Phase) -> Result<(), RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::new(phase, OverseerError::Cancelled(phase)));
    }
    Ok(())
}

fn in_phase(phase: Phase) -> impl FnOnce(OverseerError) -> RunError {
    move |e| RunError::new(phase, e)
}

fn into_outcome(
    id: Uuid,
    status: RunStatus,
    trace: RunTrace,
    duration_ms: u64,
) -> Result<RunOutcome, RunError> {
    match (trace.analysis, trace.routing, trace.execution, trace.quality) {
        (Some(analysis), Some(routing), Some(execution), Some(quality)) => Ok(RunOutcome {
            id,
            result: execution.combined_output.clone(),
            routing: (*routing).clone(),
            analysis,
            quality,
            status,
            execution,
            iterations: trace.iterations,
            replans: trace.replans,
            refinement_rounds: trace.refinement_rounds,
            duration_ms,
        }),
        _ => Err(RunError::new(
            Phase::Assessment,
            OverseerError::AgentExecution {
                worker: String::new(),
                message: "run finished without a complete trace".into(),
            },
        )),
    }
}

/// Drives a task through analysis, routing, execution, evaluation and
/// quality assessment, and records every run in the history store.
pub struct Supervisor {
    config: SupervisorConfig,
    roster: Arc<TeamRoster>,
    registry: Arc<ToolRegistry>,
    reasoner: Arc<dyn Reasoner>,
    analyzer: TaskAnalyzer,
    router: Router,
    coordinator: ExecutionCoordinator,
    assessor: QualityAssessor,
    history: Arc<dyn HistoryStore>,
    improvement: SelfImprovementEngine,
}

impl Supervisor {
    /// Wire a supervisor. The roster and registry are fixed for its lifetime.
    pub fn new(
        config: SupervisorConfig,
        roster: TeamRoster,
        registry: ToolRegistry,
        reasoner: Arc<dyn Reasoner>,
        runtime: Arc<dyn WorkerRuntime>,
        storage: Storage,
    ) -> OverseerResult<Self> {
        config.validate()?;
        if roster.is_empty() {
            return Err(OverseerError::Config("the team roster is empty".into()));
        }

        let roster = Arc::new(roster);
        let registry = Arc::new(registry);

        let compiler = compiler_for(
            &config.optimizer,
            config.max_demos,
            Arc::clone(&reasoner),
            Arc::clone(&roster),
            Arc::clone(&registry),
        )?;
        let routing_cache = Arc::new(RoutingCache::new(
            config.routing_cache_ttl(),
            config.routing_cache_capacity,
        ));
        let router = Router::new(
            Arc::clone(&reasoner),
            Arc::clone(&registry),
            routing_cache,
            Arc::clone(&storage.modules),
            compiler,
            storage.examples.clone(),
        )
        .with_backtrack_budget(config.backtrack_budget);

        let monitor = Arc::new(WorkerMonitor::new(roster.names()));
        let synthesizer = synthesizer_for(
            config.synthesis,
            Arc::clone(&runtime),
            config.summarizer.clone(),
            config.worker_timeout(),
        );
        let coordinator =
            ExecutionCoordinator::new(runtime, synthesizer, monitor, config.worker_timeout());

        let analyzer = TaskAnalyzer::new(Arc::clone(&reasoner), Arc::clone(&registry));
        let assessor = QualityAssessor::new(
            Arc::clone(&reasoner),
            config.refinement_threshold,
            config.max_refinement_rounds,
        );
        let improvement = SelfImprovementEngine::new(
            Arc::clone(&storage.history),
            Arc::clone(&storage.examples),
            Arc::clone(&storage.modules),
        );

        info!(
            workers = roster.len(),
            tools = registry.tool_count(),
            reasoner = reasoner.name(),
            optimizer = %config.optimizer,
            "Supervisor ready"
        );

        Ok(Self {
            config,
            roster,
            registry,
            reasoner,
            analyzer,
            router,
            coordinator,
            assessor,
            history: storage.history,
            improvement,
        })
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// The team.
    pub fn roster(&self) -> &TeamRoster {
        &self.roster
    }

    /// The tool catalog.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Worker monitor.
    pub fn monitor(&self) -> &Arc<WorkerMonitor> {
        self.coordinator.monitor()
    }

    /// Run a task to completion.
    pub async fn run(&self, task: &str) -> Result<RunOutcome, RunError> {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    /// Run a task, stopping early once `cancel` fires.
    ///
    /// Every run is written to history, including failed and cancelled
    /// ones. A history write failure is logged and never fails the run.
    pub async fn run_with_cancel(
        &self,
        task: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let id = Uuid::new_v4();
        let start = Instant::now();
        info!(run = %id, task = %text::preview(task, 80), "Run started");

        let mut trace = RunTrace::default();
        let outcome = self.pipeline(task, &cancel, &mut trace).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(status) => {
                self.record(id, task, status, &trace, None, duration_ms).await;
                info!(
                    run = %id,
                    status = %status,
                    score = trace.quality.as_ref().map(|q| q.score),
                    duration_ms,
                    "Run finished"
                );
                into_outcome(id, status, trace, duration_ms)
            }
            Err(err) => {
                let status = if matches!(err.source, OverseerError::Cancelled(_)) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                self.record(id, task, status, &trace, Some(err.source.to_string()), duration_ms)
                    .await;
                warn!(
                    run = %id,
                    status = %status,
                    phase = %err.phase,
                    error = %err.source,
                    duration_ms,
                    "Run stopped"
                );
                Err(err.with_partial(trace.partial_output()))
            }
        }
    }

    async fn pipeline(
        &self,
        task: &str,
        cancel: &CancellationToken,
        trace: &mut RunTrace,
    ) -> Result<RunStatus, RunError> {
        validate_task(task).map_err(in_phase(Phase::Analysis))?;
        check_cancel(cancel, Phase::Analysis)?;
        let analysis = self
            .analyzer
            .analyze(task, None)
            .await
            .map_err(in_phase(Phase::Analysis))?;
        trace.analysis = Some(analysis.clone());

        check_cancel(cancel, Phase::Routing)?;
        let mut decision = self
            .router
            .route(task, &analysis, &self.roster, None)
            .await
            .map_err(in_phase(Phase::Routing))?;
        trace.routing = Some(Arc::clone(&decision));

        let mut evaluator = ProgressEvaluator::new(
            Arc::clone(&self.reasoner),
            self.config.max_stalls,
            self.config.max_resets,
        );
        let mut guidance: Option<String> = None;
        let mut previous: Option<String> = None;

        for iteration in 0..self.config.max_iterations {
            let result = self
                .coordinator
                .dispatch(&decision, task, guidance.as_deref(), cancel)
                .await
                .map_err(in_phase(Phase::Execution))?;
            trace.iterations += 1;

            check_cancel(cancel, Phase::Evaluation)?;
            let remaining = self.config.max_iterations - iteration - 1;
            let report = evaluator
                .evaluate(task, &result, previous.as_deref(), remaining)
                .await;
            previous = Some(result.combined_output.clone());
            trace.execution = Some(result);

            match report.action {
                ProgressAction::Complete => break,
                ProgressAction::Continue => guidance = Some(report.feedback),
                ProgressAction::Replan => {
                    check_cancel(cancel, Phase::Routing)?;
                    decision = self
                        .router
                        .route(task, &analysis, &self.roster, Some(&report.feedback))
                        .await
                        .map_err(in_phase(Phase::Routing))?;
                    trace.routing = Some(Arc::clone(&decision));
                    trace.replans += 1;
                    guidance = None;
                    previous = None;
                }
            }
        }

        let mut result = trace.execution.clone().ok_or_else(|| {
            RunError::new(
                Phase::Execution,
                OverseerError::AgentExecution {
                    worker: String::new(),
                    message: "no execution took place".into(),
                },
            )
        })?;
        // Degradation anywhere in the run taints the final status.
        let mut degraded = result.is_degraded();

        check_cancel(cancel, Phase::Assessment)?;
        let mut quality = self
            .assessor
            .assess(task, &result.combined_output, 0)
            .await;

        while quality.refine {
            if cancel.is_cancelled() {
                trace.execution = Some(result);
                trace.quality = Some(quality);
                return Err(RunError::new(
                    Phase::Assessment,
                    OverseerError::Cancelled(Phase::Assessment),
                ));
            }
            let instruction = refinement_instruction(&quality);
            trace.refinement_rounds += 1;
            info!(
                round = trace.refinement_rounds,
                score = quality.score,
                "Refining output"
            );

            let refined = match self
                .coordinator
                .dispatch(&decision, task, Some(&instruction), cancel)
                .await
            {
                Ok(refined) => refined,
                Err(e @ OverseerError::Cancelled(_)) => {
                    trace.execution = Some(result);
                    trace.quality = Some(quality);
                    return Err(RunError::new(Phase::Assessment, e));
                }
                Err(e) => {
                    warn!(error = %e, "Refinement round failed, keeping previous output");
                    break;
                }
            };

            let next = self
                .assessor
                .assess(task, &refined.combined_output, trace.refinement_rounds)
                .await;
            if next.score < quality.score {
                info!(
                    before = quality.score,
                    after = next.score,
                    "Refinement did not improve the output"
                );
                break;
            }
            degraded |= refined.is_degraded();
            result = refined;
            quality = next;
        }

        let status = if degraded {
            RunStatus::Degraded
        } else {
            RunStatus::Completed
        };
        trace.execution = Some(result);
        trace.quality = Some(quality);
        Ok(status)
    }

    async fn record(
        &self,
        id: Uuid,
        task: &str,
        status: RunStatus,
        trace: &RunTrace,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let execution = match (&trace.routing, &trace.execution) {
            (Some(routing), Some(result)) => {
                Some(ExecutionSummary::from_result(routing.execution_mode, result))
            }
            _ => None,
        };
        let entry = HistoryEntry {
            id,
            task: task.to_string(),
            status,
            team_description: self.roster.describe(),
            tools_description: self.registry.describe(),
            analysis: trace.analysis.clone(),
            routing: trace.routing.as_deref().cloned(),
            execution,
            quality: trace.quality.clone(),
            refinement_rounds: trace.refinement_rounds,
            error,
            total_duration_ms: duration_ms,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.history.append(&entry).await {
            warn!(run = %id, error = %e, "Failed to persist history entry");
        }
    }

    /// Harvest recent high-quality runs into training examples, using the
    /// configured quality bar, cap and window.
    pub async fn self_improve(&self) -> OverseerResult<ImprovementReport> {
        self.self_improve_with(
            self.config.min_quality,
            self.config.max_examples,
            self.config.lookback,
        )
        .await
    }

    /// [`Supervisor::self_improve`] with explicit parameters.
    pub async fn self_improve_with(
        &self,
        min_quality: f32,
        max_examples: usize,
        lookback: usize,
    ) -> OverseerResult<ImprovementReport> {
        self.improvement
            .analyze(min_quality, max_examples, lookback)
            .await
    }

    /// History and worker statistics over the configured lookback window.
    pub async fn stats(&self) -> OverseerResult<SupervisorStats> {
        let recent = self.history.recent(self.config.lookback).await?;
        let monitor = self.coordinator.monitor();
        Ok(SupervisorStats {
            history: HistoryStats::from_entries(&recent),
            workers: monitor.snapshot().await,
            aggregate: monitor.aggregate_metrics().await,
            routing_cache_entries: self.router.cache().len(),
            module_state: self.router.modules().state(),
        })
    }

    /// Drop every cached routing decision.
    pub fn clear_routing_cache(&self) {
        self.router.cache().clear();
        info!("Routing cache cleared");
    }

    /// Drop expired routing decisions; returns how many were removed.
    pub fn purge_expired_routes(&self) -> usize {
        self.router.cache().purge_expired()
    }

    /// Mark the compiled routing module stale.
    pub async fn invalidate_module(&self) -> OverseerResult<()> {
        self.router.modules().invalidate().await
    }

    /// Recent runs, oldest first.
    pub async fn recent_runs(&self, n: usize) -> OverseerResult<Vec<HistoryEntry>> {
        self.history.recent(n).await
    }
}
