use crate::compiler::{ModuleCompiler, TrainingSource};
use crate::module_cache::ModuleCache;
use crate::routing_cache::RoutingCache;
use overseer_agent::text::has_dependency_order;
use overseer_agent::{RawRoutingDecision, Reasoner, RoutingRequest};
use overseer_core::{
    ExecutionMode, OverseerError, OverseerResult, RoutingDecision, TaskAnalysis, TeamRoster,
    ToolRegistry,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every assigned worker exists in the roster.
pub fn assert_valid_agents(decision: &RoutingDecision, roster: &TeamRoster) -> Result<(), String> {
    if decision.assigned_workers.is_empty() {
        return Err("no workers assigned".to_string());
    }
    let unknown: Vec<&str> = decision
        .assigned_workers
        .iter()
        .filter(|w| !roster.contains(w))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "unknown worker(s) {}; choose from: {}",
            unknown.join(", "),
            roster.names().join(", ")
        ))
    }
}

/// Every required tool is held by at least one assigned worker.
pub fn assert_valid_tools(decision: &RoutingDecision, registry: &ToolRegistry) -> Result<(), String> {
    let missing: Vec<&str> = decision
        .tool_requirements
        .iter()
        .filter(|tool| {
            !decision
                .assigned_workers
                .iter()
                .any(|w| registry.worker_has_tool(w, tool))
        })
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "tool(s) {} not available to any assigned worker",
            missing.join(", ")
        ))
    }
}

/// `delegated` has exactly one worker, `sequential`/`parallel` at least two.
pub fn assert_mode_agent_consistency(decision: &RoutingDecision) -> Result<(), String> {
    let count = decision.assigned_workers.len();
    if decision.execution_mode.accepts_worker_count(count) {
        Ok(())
    } else {
        Err(format!(
            "execution mode {} cannot run with {count} worker(s)",
            decision.execution_mode
        ))
    }
}

/// Turn a raw decision into a typed one, applying the tie-break policy when
/// the reasoner named no usable mode.
pub fn normalize_decision(raw: RawRoutingDecision, task: &str, analysis: &TaskAnalysis) -> RoutingDecision {
    let mut workers: Vec<String> = raw
        .assigned_workers
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();

    let stated = raw
        .execution_mode
        .as_deref()
        .and_then(|m| m.parse::<ExecutionMode>().ok());
    let mode = match stated {
        Some(mode) => mode,
        None => {
            let ordered = raw.ordered || has_dependency_order(task);
            let mode = tie_break(workers.len(), analysis.required_capabilities.len(), ordered);
            debug!(mode = %mode, "Reasoner left the mode open, applied tie-break");
            if mode == ExecutionMode::Delegated {
                workers.truncate(1);
            }
            mode
        }
    };

    let subtasks = raw
        .subtasks
        .map(|s| s.into_iter().map(|t| t.trim().to_string()).collect::<Vec<_>>())
        .filter(|s| s.len() == workers.len() && mode != ExecutionMode::Delegated);

    let tools: BTreeSet<String> = raw
        .tool_requirements
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    RoutingDecision {
        assigned_workers: workers,
        execution_mode: mode,
        subtasks,
        tool_requirements: tools,
    }
}

/// Mode for an ambiguous reasoner answer: one worker or one capability
/// means `delegated`, a stated order `sequential`, otherwise `parallel`.
pub fn tie_break(worker_count: usize, capability_count: usize, ordered: bool) -> ExecutionMode {
    if worker_count <= 1 {
        ExecutionMode::Delegated
    } else if ordered {
        ExecutionMode::Sequential
    } else if capability_count <= 1 {
        ExecutionMode::Delegated
    } else {
        ExecutionMode::Parallel
    }
}

fn validate(decision: &RoutingDecision, roster: &TeamRoster, registry: &ToolRegistry) -> Result<(), String> {
    assert_mode_agent_consistency(decision)?;
    assert_valid_agents(decision, roster)?;
    assert_valid_tools(decision, registry)
}

/// Combines analysis, roster and tool catalog into a validated routing
/// decision, through the routing cache and the compiled module.
pub struct Router {
    reasoner: Arc<dyn Reasoner>,
    registry: Arc<ToolRegistry>,
    cache: Arc<RoutingCache>,
    modules: Arc<ModuleCache>,
    compiler: Arc<dyn ModuleCompiler>,
    training: Arc<dyn TrainingSource>,
    backtrack_budget: u32,
}

impl Router {
    /// A router with the default backtrack budget of 3.
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        registry: Arc<ToolRegistry>,
        cache: Arc<RoutingCache>,
        modules: Arc<ModuleCache>,
        compiler: Arc<dyn ModuleCompiler>,
        training: Arc<dyn TrainingSource>,
    ) -> Self {
        Self {
            reasoner,
            registry,
            cache,
            modules,
            compiler,
            training,
            backtrack_budget: 3,
        }
    }

    /// Number of corrective retries after the first reasoning call.
    pub fn with_backtrack_budget(mut self, budget: u32) -> Self {
        self.backtrack_budget = budget;
        self
    }

    /// The routing cache.
    pub fn cache(&self) -> &Arc<RoutingCache> {
        &self.cache
    }

    /// The compiled-module cache.
    pub fn modules(&self) -> &Arc<ModuleCache> {
        &self.modules
    }

    /// Route a task.
    ///
    /// `feedback` carries stall history for a replan: it bypasses the cache
    /// lookup, and the new decision overwrites the cached one.
    pub async fn route(
        &self,
        task: &str,
        analysis: &TaskAnalysis,
        roster: &TeamRoster,
        feedback: Option<&str>,
    ) -> OverseerResult<Arc<RoutingDecision>> {
        let team_signature = roster.signature();

        if feedback.is_none() {
            if let Some(cached) = self.cache.get(task, &team_signature) {
                debug!(task = %task, "Routing cache hit");
                return Ok(cached);
            }
            debug!(task = %task, "Routing cache miss");
        }

        let module = self
            .modules
            .get_or_compile(self.training.as_ref(), self.compiler.as_ref())
            .await?;

        let mut correction: Option<String> = feedback.map(str::to_string);
        let mut last_decision: Option<RoutingDecision> = None;
        let mut last_violation = String::from("no routing attempt was made");

        for attempt in 0..=self.backtrack_budget {
            let request = RoutingRequest {
                task,
                analysis,
                roster,
                registry: &self.registry,
                module: &module,
                feedback: correction.as_deref(),
            };

            let raw = match self.reasoner.route(request).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, error = %e, "Reasoner failed to route");
                    last_violation = format!("reasoner error: {e}");
                    continue;
                }
            };

            let decision = normalize_decision(raw, task, analysis);
            match validate(&decision, roster, &self.registry) {
                Ok(()) => {
                    let decision = Arc::new(decision);
                    self.cache.insert(task, &team_signature, Arc::clone(&decision));
                    info!(
                        task = %task,
                        workers = ?decision.assigned_workers,
                        mode = %decision.execution_mode,
                        attempts = attempt + 1,
                        "Routing decision made"
                    );
                    return Ok(decision);
                }
                Err(violation) => {
                    warn!(attempt, violation = %violation, "Routing decision rejected, backtracking");
                    correction = Some(match feedback {
                        Some(stalls) => format!("{stalls}\n{violation}"),
                        None => violation.clone(),
                    });
                    last_violation = violation;
                    last_decision = Some(decision);
                }
            }
        }

        Err(OverseerError::Routing {
            message: format!(
                "no valid decision after {} attempt(s): {last_violation}",
                self.backtrack_budget + 1
            ),
            last_decision: last_decision.map(Box::new),
        })
    }
}
