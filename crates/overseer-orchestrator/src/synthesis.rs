use async_trait::async_trait;
use overseer_agent::WorkerRuntime;
use overseer_core::{ExecutionFault, OverseerError, OverseerResult, SynthesisKind};
use std::sync::Arc;
use std::time::Duration;

/// One parallel branch output, in assignment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutput {
    /// Worker that produced the output.
    pub worker: String,
    /// Branch output text.
    pub output: String,
}

/// Merges parallel branch outputs into one text.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &str;

    /// Merge `branches` (never empty) produced for `task`.
    async fn synthesize(&self, task: &str, branches: &[BranchOutput]) -> OverseerResult<String>;
}

/// Branch outputs under per-worker headings, in assignment order.
pub fn concatenate(branches: &[BranchOutput]) -> String {
    branches
        .iter()
        .map(|b| format!("## {}\n{}", b.worker, b.output.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Plain concatenation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate;

#[async_trait]
impl Synthesizer for Concatenate {
    fn name(&self) -> &str {
        "concatenate"
    }

    async fn synthesize(&self, _task: &str, branches: &[BranchOutput]) -> OverseerResult<String> {
        Ok(concatenate(branches))
    }
}

/// Concatenation re-summarised by a worker.
///
/// The summarising worker is the configured one, or else the last branch
/// that produced output.
pub struct Summarize {
    runtime: Arc<dyn WorkerRuntime>,
    worker: Option<String>,
    timeout: Duration,
}

impl Summarize {
    /// Summarise with `worker`, or the last branch's worker when unset.
    pub fn new(runtime: Arc<dyn WorkerRuntime>, worker: Option<String>, timeout: Duration) -> Self {
        Self {
            runtime,
            worker,
            timeout,
        }
    }
}

#[async_trait]
impl Synthesizer for Summarize {
    fn name(&self) -> &str {
        "summarize"
    }

    async fn synthesize(&self, task: &str, branches: &[BranchOutput]) -> OverseerResult<String> {
        let worker = match (&self.worker, branches.last()) {
            (Some(worker), _) => worker.clone(),
            (None, Some(last)) => last.worker.clone(),
            (None, None) => return Ok(String::new()),
        };
        let instruction = format!(
            "Merge the following partial answers into one coherent answer to the task: {task}"
        );
        let joined = concatenate(branches);

        match tokio::time::timeout(
            self.timeout,
            self.runtime.invoke(&worker, &instruction, Some(&joined)),
        )
        .await
        {
            Ok(Ok(summary)) if !summary.trim().is_empty() => Ok(summary),
            Ok(Ok(_)) => Err(OverseerError::AgentExecution {
                worker,
                message: "summary was empty".into(),
            }),
            Ok(Err(fault)) => Err(fault.into()),
            Err(_) => Err(OverseerError::Execution(ExecutionFault::Timeout {
                worker,
                elapsed: self.timeout,
            })),
        }
    }
}

/// The synthesizer selected by configuration.
pub fn synthesizer_for(
    kind: SynthesisKind,
    runtime: Arc<dyn WorkerRuntime>,
    summarizer: Option<String>,
    timeout: Duration,
) -> Arc<dyn Synthesizer> {
    match kind {
        SynthesisKind::Concatenate => Arc::new(Concatenate),
        SynthesisKind::Summarize => Arc::new(Summarize::new(runtime, summarizer, timeout)),
    }
}
