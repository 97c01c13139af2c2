//! Curated routing examples for a fresh installation.
//!
//! They assume the conventional `Researcher` / `Analyst` / `Writer` team.
//! Demonstrations naming workers that are not on the current roster are
//! ignored at routing time, so the seeds are harmless for other teams.

use overseer_core::{ExecutionMode, TrainingExample};

const SEED_TEAM: &str = "- Researcher: Finds and summarises sources (web_search)\n\
- Analyst: Runs calculations and code (code_execution)\n\
- Writer: Drafts and edits prose (no tools)";

const SEED_TOOLS: &str = "- code_execution [code_execution] used by: Analyst\n\
- web_search [web_search] used by: Researcher";

fn seed(task: &str, workers: &[&str], mode: ExecutionMode, tools: &[&str]) -> TrainingExample {
    TrainingExample {
        task: task.to_string(),
        team: SEED_TEAM.to_string(),
        tools: SEED_TOOLS.to_string(),
        assigned_to: workers.iter().map(|w| (*w).to_string()).collect(),
        execution_mode: mode,
        tool_requirements: tools.iter().map(|t| (*t).to_string()).collect(),
    }
}

/// The built-in seed training set.
pub fn seed_examples() -> Vec<TrainingExample> {
    use ExecutionMode::*;
    vec![
        seed("What is 17 * 23?", &["Analyst"], Delegated, &["code_execution"]),
        seed(
            "Find the latest release notes for Rust",
            &["Researcher"],
            Delegated,
            &["web_search"],
        ),
        seed("Write a short poem about autumn", &["Writer"], Delegated, &[]),
        seed(
            "Research the history of the printing press then write a blog post about it",
            &["Researcher", "Writer"],
            Sequential,
            &["web_search"],
        ),
        seed(
            "Compute the compound interest on 1000 at 5% for 10 years and explain the result",
            &["Analyst", "Writer"],
            Sequential,
            &["code_execution"],
        ),
        seed(
            "Look up current GPU prices and calculate the average cost per teraflop",
            &["Researcher", "Analyst"],
            Sequential,
            &["web_search", "code_execution"],
        ),
        seed(
            "Search for recent news on solar power and also plot the sine function",
            &["Researcher", "Analyst"],
            Parallel,
            &["web_search", "code_execution"],
        ),
        seed(
            "Research competitor pricing, then model the revenue impact, and finally write an executive summary",
            &["Researcher", "Analyst", "Writer"],
            Sequential,
            &["web_search", "code_execution"],
        ),
    ]
}
