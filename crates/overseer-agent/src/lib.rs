//! Reasoning and execution seams of the Overseer supervisor.
//!
//! The supervisor never talks to a model or a worker directly: it goes
//! through a [`Reasoner`] for analysis, routing, progress and quality
//! judgements, and through a [`WorkerRuntime`] to run workers.
//!
//! Two reasoners ship with the crate: the offline [`HeuristicReasoner`] and
//! the chat-completion backed [`LlmReasoner`].

/// LLM connection settings.
pub mod config;
/// Offline keyword reasoner.
pub mod heuristic;
/// HTTP worker runtime.
pub mod http_worker;
/// Chat-completion reasoner.
pub mod llm;
/// Compiled routing module.
pub mod module;
/// The reasoning seam.
pub mod reasoner;
/// Retry and backoff.
pub mod retry;
/// Text helpers.
pub mod text;
/// The worker execution seam.
pub mod worker;

pub use config::{LlmProvider, ModelConfig};
pub use heuristic::HeuristicReasoner;
pub use http_worker::HttpWorkerRuntime;
pub use llm::LlmReasoner;
pub use module::{CompiledModule, BASE_INSTRUCTIONS, DEMO_REUSE_THRESHOLD, SIGNATURE_VERSION};
pub use reasoner::{
    AnalysisRequest, ProgressJudgement, ProgressRequest, QualityJudgement, QualityRequest,
    RawAnalysis, RawRoutingDecision, Reasoner, RoutingRequest,
};
pub use retry::RetryPolicy;
pub use worker::WorkerRuntime;
