//! Persistence and learning for the Overseer supervisor.
//!
//! - [`HistoryStore`]: append-only run log ([`JsonlHistoryStore`] on disk,
//!   [`InMemoryHistoryStore`] for tests).
//! - [`TrainingExampleStore`]: the routing training set, seeded by
//!   [`seed_examples`].
//! - [`SelfImprovementEngine`]: turns high-quality runs into training
//!   examples and marks the compiled routing module stale.

/// Training-example file.
pub mod examples;
/// Run history.
pub mod history;
/// Self-improvement engine.
pub mod improvement;
/// Built-in seed examples.
pub mod seeds;

pub use examples::TrainingExampleStore;
pub use history::{HistoryStats, HistoryStore, InMemoryHistoryStore, JsonlHistoryStore};
pub use improvement::{
    to_training_example, ImprovementReport, ImprovementStatus, SelfImprovementEngine,
};
pub use seeds::seed_examples;
