use crate::seeds::seed_examples;
use async_trait::async_trait;
use overseer_core::{OverseerError, OverseerResult, TrainingExample};
use overseer_router::TrainingSource;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Training examples persisted as a JSON array.
///
/// Until the file exists, the curated seed set stands in for it. Writes go
/// through a temporary file and a rename, so readers never see a partial
/// array.
pub struct TrainingExampleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TrainingExampleStore {
    /// A store backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every example, oldest first.
    pub async fn load(&self) -> OverseerResult<Vec<TrainingExample>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No training file yet, using seed examples");
                return Ok(seed_examples());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map_err(|e| {
            OverseerError::Config(format!(
                "invalid training examples in {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Append the examples whose fingerprint is not present yet, at most
    /// `max` of them. Returns how many were added.
    pub async fn append_unique(&self, candidates: Vec<TrainingExample>, max: usize) -> OverseerResult<usize> {
        let _guard = self.lock.lock().await;
        let mut examples = self.load().await?;
        let mut seen: HashSet<_> = examples.iter().map(TrainingExample::fingerprint).collect();

        let mut added = 0;
        for candidate in candidates {
            if added >= max {
                break;
            }
            if seen.insert(candidate.fingerprint()) {
                examples.push(candidate);
                added += 1;
            }
        }

        if added > 0 {
            self.write(&examples).await?;
            info!(added, total = examples.len(), "Training examples appended");
        }
        Ok(added)
    }

    async fn write(&self, examples: &[TrainingExample]) -> OverseerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(examples)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TrainingSource for TrainingExampleStore {
    async fn load(&self) -> OverseerResult<Vec<TrainingExample>> {
        TrainingExampleStore::load(self).await
    }
}
