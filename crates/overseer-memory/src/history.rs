use async_trait::async_trait;
use overseer_core::{HistoryEntry, OverseerError, OverseerResult, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Append-only store of run records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one entry. Existing entries are never rewritten.
    async fn append(&self, entry: &HistoryEntry) -> OverseerResult<()>;

    /// The last `n` entries, oldest first.
    async fn recent(&self, n: usize) -> OverseerResult<Vec<HistoryEntry>>;

    /// Number of stored entries.
    async fn count(&self) -> OverseerResult<usize>;
}

/// In-memory history, for tests and ephemeral supervisors.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> OverseerResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, n: usize) -> OverseerResult<Vec<HistoryEntry>> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        Ok(entries[skip..].to_vec())
    }

    async fn count(&self) -> OverseerResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

/// History persisted as one JSON object per line.
///
/// Lines are only ever appended. A line that fails to parse (for example a
/// torn write after a crash) is skipped with a warning.
pub struct JsonlHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistoryStore {
    /// Open a store at `path`, creating parent directories as needed.
    pub async fn new(path: impl Into<PathBuf>) -> OverseerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    OverseerError::History(format!("Failed to create history dir: {e}"))
                })?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_all(&self) -> OverseerResult<Vec<HistoryEntry>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OverseerError::History(format!("Failed to read history: {e}"))),
        };

        let mut entries = Vec::new();
        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = lineno + 1, error = %e, "Skipping unreadable history line"),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn append(&self, entry: &HistoryEntry) -> OverseerResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| OverseerError::History(format!("Failed to serialize entry: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| OverseerError::History(format!("Failed to open history: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| OverseerError::History(format!("Failed to write entry: {e}")))?;
        file.flush()
            .await
            .map_err(|e| OverseerError::History(format!("Failed to flush history: {e}")))?;
        Ok(())
    }

    async fn recent(&self, n: usize) -> OverseerResult<Vec<HistoryEntry>> {
        let mut entries = self.read_all().await?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    async fn count(&self) -> OverseerResult<usize> {
        Ok(self.read_all().await?.len())
    }
}

/// Aggregate view over a slice of history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Entries inspected.
    pub runs: usize,
    /// Runs that completed cleanly.
    pub completed: usize,
    /// Runs that completed with failed workers.
    pub degraded: usize,
    /// Runs that failed.
    pub failed: usize,
    /// Runs that were cancelled.
    pub cancelled: usize,
    /// Share of runs that completed or degraded, in `[0, 1]`.
    pub success_rate: f64,
    /// Mean quality score over assessed runs.
    pub mean_quality: Option<f64>,
    /// Runs per execution mode.
    pub mode_counts: BTreeMap<String, usize>,
    /// Mean run duration, if any run was inspected.
    pub mean_duration_ms: Option<f64>,
}

impl HistoryStats {
    /// Summarise `entries`.
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut stats = HistoryStats {
            runs: entries.len(),
            ..Default::default()
        };
        let mut quality_sum = 0.0;
        let mut quality_n = 0usize;
        let mut duration_sum = 0.0;

        for entry in entries {
            match entry.status {
                RunStatus::Completed => stats.completed += 1,
                RunStatus::Degraded => stats.degraded += 1,
                RunStatus::Failed => stats.failed += 1,
                RunStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(score) = entry.quality_score() {
                quality_sum += f64::from(score);
                quality_n += 1;
            }
            if let Some(routing) = &entry.routing {
                *stats
                    .mode_counts
                    .entry(routing.execution_mode.to_string())
                    .or_insert(0) += 1;
            }
            duration_sum += entry.total_duration_ms as f64;
        }

        if stats.runs > 0 {
            stats.success_rate = (stats.completed + stats.degraded) as f64 / stats.runs as f64;
            stats.mean_duration_ms = Some(duration_sum / stats.runs as f64);
        }
        if quality_n > 0 {
            stats.mean_quality = Some(quality_sum / quality_n as f64);
        }
        stats
    }
}
