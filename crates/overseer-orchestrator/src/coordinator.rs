use crate::monitor::{InvocationOutcome, WorkerMonitor};
use crate::synthesis::{concatenate, BranchOutput, Synthesizer};
use overseer_agent::WorkerRuntime;
use overseer_core::{
    ExecutionFault, ExecutionMode, ExecutionResult, OverseerError, OverseerResult, Phase,
    RoutingDecision,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One worker invocation to run.
struct WorkerCall {
    index: usize,
    worker: String,
    task: String,
    context: Option<String>,
}

/// One settled worker invocation.
struct Invocation {
    index: usize,
    worker: String,
    result: Result<String, ExecutionFault>,
    duration_ms: u64,
}

async fn invoke_worker(
    runtime: Arc<dyn WorkerRuntime>,
    monitor: Arc<WorkerMonitor>,
    call: WorkerCall,
    timeout: Duration,
    cancel: CancellationToken,
) -> Invocation {
    let WorkerCall {
        index,
        worker,
        task,
        context,
    } = call;
    if cancel.is_cancelled() {
        return Invocation {
            index,
            result: Err(ExecutionFault::Cancelled {
                worker: worker.clone(),
            }),
            worker,
            duration_ms: 0,
        };
    }

    monitor.start(&worker).await;
    let start = Instant::now();
    let result = match tokio::time::timeout(
        timeout,
        runtime.invoke(&worker, &task, context.as_deref()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ExecutionFault::Timeout {
            worker: worker.clone(),
            elapsed: timeout,
        }),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let outcome = match &result {
        Ok(_) => InvocationOutcome::Succeeded,
        Err(ExecutionFault::Timeout { .. }) => InvocationOutcome::TimedOut,
        Err(_) => InvocationOutcome::Failed,
    };
    monitor.finish(&worker, outcome, duration_ms).await;
    if let Err(fault) = &result {
        warn!(worker = %worker, error = %fault, duration_ms, "Worker invocation failed");
    }

    Invocation {
        index,
        worker,
        result,
        duration_ms,
    }
}

/// Append a corrective instruction to a task text.
pub fn with_instruction(task: &str, instruction: Option<&str>) -> String {
    match instruction.map(str::trim) {
        Some(extra) if !extra.is_empty() => {
            format!("{task}\n\nAdditional instructions:\n{extra}")
        }
        _ => task.to_string(),
    }
}

/// Task text of one sequential step: the whole task, with the step's own
/// subtask, if any, as a hint.
fn sequential_step(decision: &RoutingDecision, index: usize, task: &str) -> String {
    let subtask = decision.subtask_for(index, task);
    if subtask == task {
        task.to_string()
    } else {
        format!("{task}\n\nYour step: {subtask}")
    }
}

fn record_duration(result: &mut ExecutionResult, phase: String, duration_ms: u64) {
    *result.phase_durations_ms.entry(phase).or_insert(0) += duration_ms;
}

fn fatal(fault: ExecutionFault) -> OverseerError {
    match fault {
        ExecutionFault::Cancelled { .. } => OverseerError::Cancelled(Phase::Execution),
        other => OverseerError::AgentExecution {
            worker: other.worker().to_string(),
            message: other.to_string(),
        },
    }
}

/// Dispatches a routing decision to the worker runtime and aggregates
/// the outputs.
///
/// Delegated and final-sequential failures are fatal. Parallel branches
/// fail independently: the result degrades to the surviving branches.
pub struct ExecutionCoordinator {
    runtime: Arc<dyn WorkerRuntime>,
    synthesizer: Arc<dyn Synthesizer>,
    monitor: Arc<WorkerMonitor>,
    worker_timeout: Duration,
}

impl ExecutionCoordinator {
    /// Each worker invocation is bounded by `worker_timeout`.
    pub fn new(
        runtime: Arc<dyn WorkerRuntime>,
        synthesizer: Arc<dyn Synthesizer>,
        monitor: Arc<WorkerMonitor>,
        worker_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            synthesizer,
            monitor,
            worker_timeout,
        }
    }

    /// Worker monitor fed by every invocation.
    pub fn monitor(&self) -> &Arc<WorkerMonitor> {
        &self.monitor
    }

    /// Execute `decision` for `task`, with `instruction` appended to every
    /// worker's task text.
    ///
    /// No worker is started once `cancel` fires; invocations already in
    /// flight run to completion or time out.
    pub async fn dispatch(
        &self,
        decision: &RoutingDecision,
        task: &str,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> OverseerResult<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(OverseerError::Cancelled(Phase::Execution));
        }
        if decision.assigned_workers.is_empty() {
            return Err(OverseerError::AgentExecution {
                worker: String::new(),
                message: "no worker assigned".into(),
            });
        }

        let start = Instant::now();
        let result = match decision.execution_mode {
            ExecutionMode::Delegated => self.delegated(decision, task, instruction, cancel).await,
            ExecutionMode::Sequential => self.sequential(decision, task, instruction, cancel).await,
            ExecutionMode::Parallel => self.parallel(decision, task, instruction, cancel).await,
        }?;

        info!(
            mode = %decision.execution_mode,
            workers = ?decision.assigned_workers,
            failed = ?result.failed_workers,
            duration_ms = start.elapsed().as_millis() as u64,
            "Execution finished"
        );
        Ok(result)
    }

    async fn invoke(
        &self,
        index: usize,
        worker: &str,
        task: String,
        context: Option<String>,
        cancel: &CancellationToken,
    ) -> Invocation {
        invoke_worker(
            Arc::clone(&self.runtime),
            Arc::clone(&self.monitor),
            WorkerCall {
                index,
                worker: worker.to_string(),
                task,
                context,
            },
            self.worker_timeout,
            cancel.clone(),
        )
        .await
    }

    async fn delegated(
        &self,
        decision: &RoutingDecision,
        task: &str,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> OverseerResult<ExecutionResult> {
        let worker = &decision.assigned_workers[0];
        let step = with_instruction(task, instruction);
        let invocation = self.invoke(0, worker, step, None, cancel).await;

        let mut result = ExecutionResult::default();
        record_duration(&mut result, format!("worker:{worker}"), invocation.duration_ms);
        let output = invocation.result.map_err(fatal)?;
        result.outputs.insert(worker.clone(), output.clone());
        result.combined_output = output;
        Ok(result)
    }

    async fn sequential(
        &self,
        decision: &RoutingDecision,
        task: &str,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> OverseerResult<ExecutionResult> {
        let mut result = ExecutionResult::default();
        let last = decision.assigned_workers.len() - 1;
        // Output of the most recent successful step.
        let mut context: Option<String> = None;

        for (index, worker) in decision.assigned_workers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(OverseerError::Cancelled(Phase::Execution));
            }
            let step = with_instruction(&sequential_step(decision, index, task), instruction);
            let invocation = self.invoke(index, worker, step, context.clone(), cancel).await;
            record_duration(&mut result, format!("worker:{worker}"), invocation.duration_ms);

            match invocation.result {
                Ok(output) => {
                    result.outputs.insert(worker.clone(), output.clone());
                    context = Some(output);
                }
                Err(fault) if index == last => return Err(fatal(fault)),
                Err(fault) => {
                    if matches!(fault, ExecutionFault::Cancelled { .. }) {
                        return Err(fatal(fault));
                    }
                    warn!(worker = %worker, step = index, "Sequential step failed, continuing chain");
                    result.failed_workers.push(worker.clone());
                }
            }
        }

        result.combined_output = context.unwrap_or_default();
        Ok(result)
    }

    async fn parallel(
        &self,
        decision: &RoutingDecision,
        task: &str,
        instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> OverseerResult<ExecutionResult> {
        let workers = &decision.assigned_workers;
        let mut join_set = JoinSet::new();

        for (index, worker) in workers.iter().enumerate() {
            let step = with_instruction(decision.subtask_for(index, task), instruction);
            join_set.spawn(invoke_worker(
                Arc::clone(&self.runtime),
                Arc::clone(&self.monitor),
                WorkerCall {
                    index,
                    worker: worker.clone(),
                    task: step,
                    context: None,
                },
                self.worker_timeout,
                cancel.clone(),
            ));
        }

        let mut result = ExecutionResult::default();
        let mut settled: Vec<Option<Result<String, ExecutionFault>>> = vec![None; workers.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(invocation) => {
                    record_duration(
                        &mut result,
                        format!("worker:{}", invocation.worker),
                        invocation.duration_ms,
                    );
                    settled[invocation.index] = Some(invocation.result);
                }
                Err(e) => error!(error = %e, "Worker task panicked"),
            }
        }

        let mut branches = Vec::with_capacity(workers.len());
        for (worker, outcome) in workers.iter().zip(settled) {
            match outcome {
                Some(Ok(output)) => {
                    result.outputs.insert(worker.clone(), output.clone());
                    branches.push(BranchOutput {
                        worker: worker.clone(),
                        output,
                    });
                }
                Some(Err(_)) | None => result.failed_workers.push(worker.clone()),
            }
        }

        if branches.is_empty() {
            if cancel.is_cancelled() {
                return Err(OverseerError::Cancelled(Phase::Execution));
            }
            return Err(OverseerError::AgentExecution {
                worker: result.failed_workers.join(", "),
                message: "every parallel branch failed".into(),
            });
        }

        let start = Instant::now();
        result.combined_output = if cancel.is_cancelled() {
            concatenate(&branches)
        } else {
            match self.synthesizer.synthesize(task, &branches).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        synthesizer = self.synthesizer.name(),
                        error = %e,
                        "Synthesis failed, falling back to concatenation"
                    );
                    concatenate(&branches)
                }
            }
        };
        record_duration(
            &mut result,
            "synthesis".to_string(),
            start.elapsed().as_millis() as u64,
        );

        Ok(result)
    }
}
