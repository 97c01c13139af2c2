use crate::retry::{with_retry, RetryPolicy};
use crate::worker::WorkerRuntime;
use async_trait::async_trait;
use overseer_core::{ExecutionFault, OverseerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    worker: &'a str,
    task: &'a str,
    context: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    output: String,
}

/// Worker runtime that forwards each invocation to an HTTP endpoint.
///
/// The endpoint receives `{"worker", "task", "context"}` as JSON and must
/// answer `{"output": "..."}`. Workers without their own endpoint use the
/// default one, if configured.
pub struct HttpWorkerRuntime {
    http: reqwest::Client,
    endpoints: HashMap<String, String>,
    default_endpoint: Option<String>,
    retry: RetryPolicy,
}

impl HttpWorkerRuntime {
    /// A runtime with no endpoints and the default retry policy.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints: HashMap::new(),
            default_endpoint: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Route one worker to `url`.
    pub fn with_endpoint(mut self, worker: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(worker.into(), url.into());
        self
    }

    /// Endpoint for workers without their own.
    pub fn with_default_endpoint(mut self, url: impl Into<String>) -> Self {
        self.default_endpoint = Some(url.into());
        self
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint_for(&self, worker: &str) -> Option<&str> {
        self.endpoints
            .get(worker)
            .or(self.default_endpoint.as_ref())
            .map(String::as_str)
    }

    async fn post(
        &self,
        url: &str,
        worker: &str,
        task: &str,
        context: Option<&str>,
    ) -> Result<String, OverseerError> {
        let resp = self
            .http
            .post(url)
            .json(&InvokeRequest {
                worker,
                task,
                context,
            })
            .send()
            .await
            .map_err(|e| OverseerError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(OverseerError::Http(format!("worker endpoint {status}: {body}")));
        }

        let parsed: InvokeResponse = resp
            .json()
            .await
            .map_err(|e| OverseerError::Http(format!("invalid worker response: {e}")))?;
        Ok(parsed.output)
    }
}

impl Default for HttpWorkerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRuntime for HttpWorkerRuntime {
    async fn invoke(
        &self,
        worker: &str,
        task: &str,
        context: Option<&str>,
    ) -> Result<String, ExecutionFault> {
        let url = self
            .endpoint_for(worker)
            .ok_or_else(|| ExecutionFault::failed(worker, "no endpoint configured"))?;
        debug!(worker, url, "Invoking worker");

        with_retry(&self.retry, worker, || self.post(url, worker, task, context))
            .await
            .map_err(|e| ExecutionFault::failed(worker, e.to_string()))
    }
}
