//! `overseer.toml` loading and wiring of the supervisor's collaborators.

use anyhow::Context;
use overseer_agent::{HeuristicReasoner, HttpWorkerRuntime, LlmReasoner, ModelConfig, Reasoner};
use overseer_core::{SupervisorConfig, TeamRoster, ToolRegistry, ToolSpec, WorkerProfile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable that supplies the LLM API key when the config has none.
pub const API_KEY_ENV: &str = "OVERSEER_API_KEY";

/// Contents of `overseer.toml`.
#[derive(Debug, Deserialize)]
pub struct OverseerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
    /// Endpoint for workers that do not name their own.
    #[serde(default)]
    pub default_endpoint: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

/// Which reasoner drives analysis, routing and judgement.
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReasonerConfig {
    /// Offline keyword heuristics.
    #[default]
    Heuristic,
    /// Chat-completion model.
    Llm(ModelConfig),
}

/// One `[[workers]]` entry.
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl OverseerConfig {
    /// Read and parse a config file.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("Invalid config file")?;
        Ok(config)
    }

    pub fn roster(&self) -> TeamRoster {
        TeamRoster::new(
            self.workers
                .iter()
                .map(|w| WorkerProfile::new(&w.name, &w.description).with_tools(w.tools.clone()))
                .collect(),
        )
    }

    pub fn registry(&self, roster: &TeamRoster) -> ToolRegistry {
        ToolRegistry::from_roster(roster, self.tools.clone())
    }

    /// Build the configured reasoner. An LLM reasoner without an API key in
    /// the file takes it from `api_key`, normally read from [`API_KEY_ENV`].
    pub fn reasoner(&self, api_key: Option<String>) -> anyhow::Result<Arc<dyn Reasoner>> {
        match &self.reasoner {
            ReasonerConfig::Heuristic => Ok(Arc::new(HeuristicReasoner::new())),
            ReasonerConfig::Llm(model) => {
                let mut model = model.clone();
                if model.api_key.is_empty() {
                    if let Some(key) = api_key {
                        model.api_key = key;
                    }
                }
                Ok(Arc::new(LlmReasoner::new(model)?))
            }
        }
    }

    /// HTTP runtime with one endpoint per worker that declares one.
    pub fn runtime(&self) -> HttpWorkerRuntime {
        let mut runtime = HttpWorkerRuntime::new();
        if let Some(url) = &self.default_endpoint {
            runtime = runtime.with_default_endpoint(url);
        }
        for worker in &self.workers {
            if let Some(url) = &worker.endpoint {
                runtime = runtime.with_endpoint(&worker.name, url);
            }
        }
        runtime
    }
}
