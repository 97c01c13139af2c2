use async_trait::async_trait;
use overseer_core::ExecutionFault;

/// The external runtime that actually executes workers.
///
/// Must tolerate concurrent `invoke` calls: parallel mode fans out one call
/// per assigned worker.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Run `worker` on `task`, with the output of a previous step as `context`.
    async fn invoke(
        &self,
        worker: &str,
        task: &str,
        context: Option<&str>,
    ) -> Result<String, ExecutionFault>;
}
