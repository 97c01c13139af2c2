use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What a worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// No invocation in flight and the last one succeeded.
    Idle,
    /// At least one invocation in flight.
    Working,
    /// The last invocation failed.
    Error,
}

/// Cumulative invocation metrics of one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Invocations finished.
    pub invocations: u64,
    /// Invocations that failed, timeouts included.
    pub failures: u64,
    /// Invocations that timed out.
    pub timeouts: u64,
    /// Cumulative invocation time.
    pub duration_ms: u64,
}

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    /// Worker name.
    pub name: String,
    /// Current status.
    pub status: WorkerStatus,
    /// Invocations currently running; parallel mode may run several.
    pub in_flight: u32,
    /// Cumulative metrics.
    pub metrics: WorkerMetrics,
}

impl WorkerState {
    fn idle(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: WorkerStatus::Idle,
            in_flight: 0,
            metrics: WorkerMetrics::default(),
        }
    }
}

/// How an invocation ended, as far as the monitor cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The worker answered.
    Succeeded,
    /// The worker reported a fault.
    Failed,
    /// The invocation exceeded its timeout.
    TimedOut,
}

/// Tracks state and metrics for every worker the supervisor invokes.
pub struct WorkerMonitor {
    states: Arc<RwLock<HashMap<String, WorkerState>>>,
}

impl WorkerMonitor {
    /// A monitor pre-populated with `workers`, all idle.
    pub fn new<I, S>(workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let states = workers
            .into_iter()
            .map(|w| {
                let name = w.as_ref();
                (name.to_string(), WorkerState::idle(name))
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a worker as working. Unknown workers are tracked on first use.
    pub async fn start(&self, worker: &str) {
        let mut states = self.states.write().await;
        let state = states
            .entry(worker.to_string())
            .or_insert_with(|| WorkerState::idle(worker));
        state.in_flight += 1;
        state.status = WorkerStatus::Working;
    }

    /// Record the end of an invocation.
    pub async fn finish(&self, worker: &str, outcome: InvocationOutcome, duration_ms: u64) {
        let mut states = self.states.write().await;
        let state = states
            .entry(worker.to_string())
            .or_insert_with(|| WorkerState::idle(worker));
        state.in_flight = state.in_flight.saturating_sub(1);
        state.metrics.invocations += 1;
        state.metrics.duration_ms += duration_ms;
        match outcome {
            InvocationOutcome::Succeeded => {}
            InvocationOutcome::Failed => state.metrics.failures += 1,
            InvocationOutcome::TimedOut => {
                state.metrics.failures += 1;
                state.metrics.timeouts += 1;
            }
        }
        state.status = if state.in_flight > 0 {
            WorkerStatus::Working
        } else if outcome == InvocationOutcome::Succeeded {
            WorkerStatus::Idle
        } else {
            WorkerStatus::Error
        };
    }

    /// All worker states, sorted by name.
    pub async fn snapshot(&self) -> Vec<WorkerState> {
        let states = self.states.read().await;
        let mut all: Vec<WorkerState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Snapshot of one worker.
    pub async fn get_state(&self, worker: &str) -> Option<WorkerState> {
        let states = self.states.read().await;
        states.get(worker).cloned()
    }

    /// Metrics summed across all workers.
    pub async fn aggregate_metrics(&self) -> WorkerMetrics {
        let states = self.states.read().await;
        let mut total = WorkerMetrics::default();
        for state in states.values() {
            total.invocations += state.metrics.invocations;
            total.failures += state.metrics.failures;
            total.timeouts += state.metrics.timeouts;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Current state as JSON, for the CLI.
    pub async fn to_json(&self) -> serde_json::Value {
        let workers = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "workers": workers,
            "aggregate": aggregate,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let monitor = WorkerMonitor::new(["Writer", "Analyst"]);
        let states = monitor.snapshot().await;
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].name, "Analyst");
        for state in &states {
            assert_eq!(state.status, WorkerStatus::Idle);
            assert_eq!(state.in_flight, 0);
        }
    }

    #[tokio::test]
    async fn test_start_and_finish() {
        let monitor = WorkerMonitor::new(["Analyst"]);
        monitor.start("Analyst").await;
        monitor.start("Analyst").await;
        let state = monitor.get_state("Analyst").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.in_flight, 2);

        monitor.finish("Analyst", InvocationOutcome::Succeeded, 40).await;
        assert_eq!(
            monitor.get_state("Analyst").await.unwrap().status,
            WorkerStatus::Working
        );

        monitor.finish("Analyst", InvocationOutcome::Succeeded, 60).await;
        let state = monitor.get_state("Analyst").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert_eq!(state.metrics.invocations, 2);
        assert_eq!(state.metrics.duration_ms, 100);
    }

    #[tokio::test]
    async fn test_failures_and_timeouts() {
        let monitor = WorkerMonitor::new(["Writer"]);
        monitor.start("Writer").await;
        monitor.finish("Writer", InvocationOutcome::TimedOut, 5).await;
        monitor.start("Researcher").await;
        monitor.finish("Researcher", InvocationOutcome::Failed, 1).await;

        let writer = monitor.get_state("Writer").await.unwrap();
        assert_eq!(writer.status, WorkerStatus::Error);
        assert_eq!(writer.metrics.timeouts, 1);
        assert_eq!(writer.metrics.failures, 1);

        let agg = monitor.aggregate_metrics().await;
        assert_eq!(agg.invocations, 2);
        assert_eq!(agg.failures, 2);
        assert_eq!(agg.timeouts, 1);
    }

    #[tokio::test]
    async fn test_to_json() {
        let monitor = WorkerMonitor::new(["Writer"]);
        let json = monitor.to_json().await;
        assert!(json["workers"].is_array());
        assert_eq!(json["workers"][0]["status"], "idle");
        assert!(json["aggregate"].is_object());
    }
}
