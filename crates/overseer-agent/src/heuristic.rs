use crate::module::{CompiledModule, DEMO_REUSE_THRESHOLD};
use crate::reasoner::{
    AnalysisRequest, ProgressJudgement, ProgressRequest, QualityJudgement, QualityRequest,
    RawAnalysis, RawRoutingDecision, Reasoner, RoutingRequest,
};
use crate::text;
use async_trait::async_trait;
use overseer_core::{ExecutionMode, OverseerResult, TeamRoster, ToolRegistry};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

static ARITHMETIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?\s*[-+*/^%]\s*\d+").ok());

const ERROR_MARKERS: &[&str] = &["error:", "failed to", "unable to", "i cannot", "i can't"];

/// A deterministic, offline reasoner.
///
/// Capabilities are detected through the tool registry's keyword vocabulary,
/// task steps through ordering phrases, and workers are matched by tool
/// coverage and by overlap between the task and their name/description.
/// Close demonstrations from the compiled module are reused as-is.
#[derive(Debug, Clone, Default)]
pub struct HeuristicReasoner;

impl HeuristicReasoner {
    /// Create a heuristic reasoner.
    pub fn new() -> Self {
        Self
    }
}

/// Capabilities from the registry vocabulary mentioned by `text`, in order
/// of first mention.
pub fn detect_capabilities(text: &str, registry: &ToolRegistry) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<(usize, String)> = Vec::new();

    for cap in registry.vocabulary() {
        let first = registry
            .keywords_for(&cap)
            .iter()
            .filter(|kw| text::mentions(&lower, kw))
            .filter_map(|kw| lower.find(kw.as_str()))
            .min();
        if let Some(pos) = first {
            found.push((pos, cap));
        }
    }

    if let Some(re) = ARITHMETIC.as_ref() {
        if let Some(m) = re.find(&lower) {
            let cap = "code_execution".to_string();
            if registry.vocabulary().contains(&cap) && !found.iter().any(|(_, c)| c == &cap) {
                found.push((m.start(), cap));
            }
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, cap)| cap).collect()
}

/// Best worker for one part of a task, or `None` if nobody matches.
fn best_worker<'a>(part: &str, roster: &'a TeamRoster, registry: &ToolRegistry) -> Option<&'a str> {
    let part_caps = detect_capabilities(part, registry);
    let part_tokens = text::token_set(part);

    let mut best: Option<(&str, usize)> = None;
    for worker in roster.workers() {
        let caps = registry.worker_capabilities(&worker.name);
        let cap_score = part_caps.iter().filter(|c| caps.contains(*c)).count() * 3;
        let profile = text::token_set(&format!("{} {}", worker.name, worker.description));
        let overlap = part_tokens
            .iter()
            .filter(|t| profile.iter().any(|p| text::words_match(t, p)))
            .count();
        let score = cap_score + overlap;
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((worker.name.as_str(), score));
        }
    }
    best.map(|(name, _)| name)
}

/// Fallback when no part of the task matches a worker: whoever covers the
/// most required capabilities, else the first worker.
fn fallback_worker<'a>(
    capabilities: &[String],
    roster: &'a TeamRoster,
    registry: &ToolRegistry,
) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;
    for worker in roster.workers() {
        let caps = registry.worker_capabilities(&worker.name);
        let covered = capabilities.iter().filter(|c| caps.contains(*c)).count();
        if best.map_or(true, |(_, s)| covered > s) {
            best = Some((worker.name.as_str(), covered));
        }
    }
    best.map(|(name, _)| name)
}

/// Tools the assigned workers need for `capabilities`.
fn required_tools(
    capabilities: &[String],
    workers: &[String],
    registry: &ToolRegistry,
) -> Vec<String> {
    let mut tools = BTreeSet::new();
    for cap in capabilities {
        let holder = registry
            .tools_for_capability(cap)
            .into_iter()
            .find(|tool| workers.iter().any(|w| registry.worker_has_tool(w, tool)));
        if let Some(tool) = holder {
            tools.insert(tool.to_string());
        }
    }
    tools.into_iter().collect()
}

fn reuse_demo(request: &RoutingRequest<'_>) -> Option<RawRoutingDecision> {
    let module: &CompiledModule = request.module;
    let (demo, score) = module.nearest_demo(request.task, request.roster)?;
    if score < DEMO_REUSE_THRESHOLD
        || !demo.execution_mode.accepts_worker_count(demo.assigned_to.len())
    {
        return None;
    }
    debug!(demo = %demo.task, score, "Reusing routing demonstration");
    let tools = demo
        .tool_requirements
        .iter()
        .filter(|t| {
            demo.assigned_to
                .iter()
                .any(|w| request.registry.worker_has_tool(w, t))
        })
        .cloned()
        .collect();
    Some(RawRoutingDecision {
        assigned_workers: demo.assigned_to.clone(),
        execution_mode: Some(demo.execution_mode.to_string()),
        subtasks: None,
        tool_requirements: tools,
        ordered: demo.execution_mode == ExecutionMode::Sequential,
    })
}

/// Fraction of the task's content tokens that the output mentions.
fn coverage(task: &str, output: &str) -> (f32, Vec<String>) {
    let task_tokens = text::token_set(task);
    if task_tokens.is_empty() {
        return (1.0, Vec::new());
    }
    let output_tokens = text::token_set(output);
    let missing: Vec<String> = task_tokens
        .iter()
        .filter(|t| !output_tokens.iter().any(|o| text::words_match(t, o)))
        .cloned()
        .collect();
    let covered = task_tokens.len() - missing.len();
    (covered as f32 / task_tokens.len() as f32, missing)
}

#[async_trait]
impl Reasoner for HeuristicReasoner {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> OverseerResult<RawAnalysis> {
        let caps = detect_capabilities(request.task, request.registry);
        let steps = (text::ordered_clauses(request.task).len() as u32)
            .max(caps.len() as u32)
            .max(1);

        let complexity = if steps >= 4 || caps.len() >= 3 {
            Some("complex")
        } else if steps == 1 && caps.len() == 1 {
            Some("simple")
        } else if steps >= 2 || caps.len() == 2 {
            Some("moderate")
        } else {
            None
        };

        Ok(RawAnalysis {
            complexity: complexity.map(str::to_string),
            required_capabilities: caps,
            estimated_steps: Some(steps),
        })
    }

    async fn route(&self, request: RoutingRequest<'_>) -> OverseerResult<RawRoutingDecision> {
        if let Some(decision) = reuse_demo(&request) {
            return Ok(decision);
        }

        let ordered = text::ordered_clauses(request.task);
        let (parts, is_ordered) = if ordered.len() > 1 {
            (ordered, true)
        } else {
            (text::independent_clauses(request.task), false)
        };

        let mut assignments: Vec<(String, String)> = Vec::new();
        for part in parts {
            match best_worker(&part, request.roster, request.registry) {
                Some(worker) => {
                    let merge_into = if is_ordered {
                        assignments.last_mut().filter(|(w, _)| w == worker)
                    } else {
                        assignments.iter_mut().find(|(w, _)| w == worker)
                    };
                    match merge_into {
                        Some((_, subtask)) => {
                            subtask.push_str("; ");
                            subtask.push_str(&part);
                        }
                        None => assignments.push((worker.to_string(), part)),
                    }
                }
                None if is_ordered => {
                    if let Some((_, subtask)) = assignments.last_mut() {
                        subtask.push_str("; ");
                        subtask.push_str(&part);
                    }
                }
                None => {}
            }
        }

        let mut capabilities = request.analysis.required_capabilities.clone();
        for cap in detect_capabilities(request.task, request.registry) {
            if !capabilities.contains(&cap) {
                capabilities.push(cap);
            }
        }

        if assignments.len() >= 2 {
            let workers: Vec<String> = assignments.iter().map(|(w, _)| w.clone()).collect();
            let subtasks: Vec<String> = assignments.into_iter().map(|(_, s)| s).collect();
            let mode = if is_ordered {
                ExecutionMode::Sequential
            } else {
                ExecutionMode::Parallel
            };
            return Ok(RawRoutingDecision {
                tool_requirements: required_tools(&capabilities, &workers, request.registry),
                assigned_workers: workers,
                execution_mode: Some(mode.to_string()),
                subtasks: Some(subtasks),
                ordered: is_ordered,
            });
        }

        let worker = match assignments.into_iter().next() {
            Some((worker, _)) => Some(worker),
            None => fallback_worker(&capabilities, request.roster, request.registry)
                .map(str::to_string),
        };
        let workers: Vec<String> = worker.into_iter().collect();
        Ok(RawRoutingDecision {
            tool_requirements: required_tools(&capabilities, &workers, request.registry),
            execution_mode: Some(ExecutionMode::Delegated.to_string()),
            assigned_workers: workers,
            subtasks: None,
            ordered: false,
        })
    }

    async fn judge_progress(&self, request: ProgressRequest<'_>) -> OverseerResult<ProgressJudgement> {
        let output = request.output.trim();
        if output.is_empty() {
            return Ok(ProgressJudgement {
                complete: false,
                made_progress: false,
                feedback: "No output was produced; answer the task directly.".to_string(),
            });
        }

        let made_progress = request
            .previous_output
            .map_or(true, |previous| previous.trim() != output);
        let (covered, missing) = coverage(request.task, output);
        let complete = covered >= 0.5;

        let feedback = if complete {
            "The output addresses the task.".to_string()
        } else {
            format!("The output does not yet address: {}.", missing.join(", "))
        };

        Ok(ProgressJudgement {
            complete,
            made_progress,
            feedback,
        })
    }

    async fn assess_quality(&self, request: QualityRequest<'_>) -> OverseerResult<QualityJudgement> {
        let output = request.output.trim();
        if output.is_empty() {
            return Ok(QualityJudgement {
                score: 0.0,
                missing_elements: vec!["an answer".to_string()],
                improvement_suggestions: "Produce an answer to the task.".to_string(),
            });
        }

        let (covered, mut missing) = coverage(request.task, output);
        missing.truncate(5);

        let task_tokens = text::token_set(request.task).len().max(1);
        let words = output.split_whitespace().count();
        let substance = (words as f32 / (10 * task_tokens) as f32).min(1.0);
        let lower = output.to_lowercase();
        let clean = if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
            0.0
        } else {
            1.0
        };

        let score = (6.0 * covered + 2.0 * substance + 2.0 * clean).clamp(0.0, 10.0);
        let improvement_suggestions = if !missing.is_empty() {
            format!("Cover: {}.", missing.join(", "))
        } else if substance < 0.5 {
            "Expand the answer with more supporting detail.".to_string()
        } else if clean == 0.0 {
            "Resolve the errors reported in the output.".to_string()
        } else {
            String::new()
        };

        Ok(QualityJudgement {
            score,
            missing_elements: missing,
            improvement_suggestions,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::module::CompiledModule;
    use overseer_core::{Complexity, TaskAnalysis, TrainingExample, WorkerProfile};

    fn setup(workers: Vec<WorkerProfile>) -> (TeamRoster, ToolRegistry) {
        let roster = TeamRoster::new(workers);
        let registry = ToolRegistry::from_roster(&roster, vec![]);
        (roster, registry)
    }

    async fn route(
        task: &str,
        roster: &TeamRoster,
        registry: &ToolRegistry,
        module: &CompiledModule,
    ) -> RawRoutingDecision {
        let reasoner = HeuristicReasoner::new();
        let raw = reasoner
            .analyze(AnalysisRequest {
                task,
                context: None,
                registry,
            })
            .await
            .unwrap();
        let analysis = TaskAnalysis::new(
            Complexity::Moderate,
            raw.required_capabilities,
            raw.estimated_steps.unwrap_or(1),
        );
        reasoner
            .route(RoutingRequest {
                task,
                analysis: &analysis,
                roster,
                registry,
                module,
                feedback: None,
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_detect_capabilities_in_order() {
        let (_, registry) = setup(vec![
            WorkerProfile::new("A", "").with_tools(["web_search", "code_execution"]),
        ]);
        assert_eq!(
            detect_capabilities("Compute the mean, then search for context", &registry),
            vec!["code_execution", "web_search"]
        );
        assert_eq!(detect_capabilities("2+2", &registry), vec!["code_execution"]);
        assert!(detect_capabilities("Say hello", &registry).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_arithmetic_is_simple() {
        let (_, registry) = setup(vec![WorkerProfile::new("Analyst", "").with_tools(["code_execution"])]);
        let raw = HeuristicReasoner::new()
            .analyze(AnalysisRequest {
                task: "2+2",
                context: None,
                registry: &registry,
            })
            .await
            .unwrap();
        assert_eq!(raw.complexity.as_deref(), Some("simple"));
        assert_eq!(raw.required_capabilities, vec!["code_execution"]);
        assert_eq!(raw.estimated_steps, Some(1));
    }

    #[tokio::test]
    async fn test_analyze_ambiguous_leaves_complexity_open() {
        let (_, registry) = setup(vec![WorkerProfile::new("Writer", "")]);
        let raw = HeuristicReasoner::new()
            .analyze(AnalysisRequest {
                task: "Say hello",
                context: None,
                registry: &registry,
            })
            .await
            .unwrap();
        assert_eq!(raw.complexity, None);
    }

    #[tokio::test]
    async fn test_route_arithmetic_to_single_analyst() {
        let (roster, registry) =
            setup(vec![WorkerProfile::new("Analyst", "").with_tools(["code_execution"])]);
        let module = CompiledModule::baseline("labeled_fewshot", "h");
        let raw = route("2+2", &roster, &registry, &module).await;
        assert_eq!(raw.assigned_workers, vec!["Analyst"]);
        assert_eq!(raw.execution_mode.as_deref(), Some("delegated"));
        assert_eq!(raw.tool_requirements, vec!["code_execution"]);
    }

    #[tokio::test]
    async fn test_route_research_then_write_is_sequential() {
        let (roster, registry) = setup(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ]);
        let module = CompiledModule::baseline("labeled_fewshot", "h");
        let raw = route("Research X then write a report on X", &roster, &registry, &module).await;
        assert_eq!(raw.assigned_workers, vec!["Researcher", "Writer"]);
        assert_eq!(raw.execution_mode.as_deref(), Some("sequential"));
        assert!(raw.ordered);
        assert_eq!(
            raw.subtasks,
            Some(vec!["Research X".to_string(), "write a report on X".to_string()])
        );
        assert_eq!(raw.tool_requirements, vec!["web_search"]);
    }

    #[tokio::test]
    async fn test_route_independent_parts_is_parallel() {
        let (roster, registry) = setup(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Analyst", "").with_tools(["code_execution"]),
        ]);
        let module = CompiledModule::baseline("labeled_fewshot", "h");
        let raw = route(
            "Search the latest news and compute the average price",
            &roster,
            &registry,
            &module,
        )
        .await;
        assert_eq!(raw.assigned_workers, vec!["Researcher", "Analyst"]);
        assert_eq!(raw.execution_mode.as_deref(), Some("parallel"));
    }

    #[tokio::test]
    async fn test_route_unmatched_task_falls_back_to_first_worker() {
        let (roster, registry) = setup(vec![
            WorkerProfile::new("Generalist", ""),
            WorkerProfile::new("Other", ""),
        ]);
        let module = CompiledModule::baseline("labeled_fewshot", "h");
        let raw = route("Say hello", &roster, &registry, &module).await;
        assert_eq!(raw.assigned_workers, vec!["Generalist"]);
        assert_eq!(raw.execution_mode.as_deref(), Some("delegated"));
    }

    #[tokio::test]
    async fn test_route_reuses_close_demonstration() {
        let (roster, registry) = setup(vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ]);
        let mut module = CompiledModule::baseline("bootstrap_fewshot", "h");
        module.demos.push(TrainingExample {
            task: "Draft the quarterly newsletter".into(),
            team: String::new(),
            tools: String::new(),
            assigned_to: vec!["Researcher".into(), "Writer".into()],
            execution_mode: ExecutionMode::Parallel,
            tool_requirements: vec!["web_search".into()],
        });
        let raw = route("Draft the quarterly newsletter", &roster, &registry, &module).await;
        assert_eq!(raw.assigned_workers, vec!["Researcher", "Writer"]);
        assert_eq!(raw.execution_mode.as_deref(), Some("parallel"));
        assert_eq!(raw.tool_requirements, vec!["web_search"]);
    }

    #[tokio::test]
    async fn test_progress_judgement() {
        let reasoner = HeuristicReasoner::new();
        let done = reasoner
            .judge_progress(ProgressRequest {
                task: "Summarise rust ownership",
                output: "Rust ownership, summarised: each value has one owner.",
                previous_output: None,
                failed_workers: &[],
                remaining_iterations: 2,
            })
            .await
            .unwrap();
        assert!(done.complete);
        assert!(done.made_progress);

        let stalled = reasoner
            .judge_progress(ProgressRequest {
                task: "Summarise rust ownership",
                output: "unrelated",
                previous_output: Some("unrelated"),
                failed_workers: &[],
                remaining_iterations: 1,
            })
            .await
            .unwrap();
        assert!(!stalled.complete);
        assert!(!stalled.made_progress);
        assert!(stalled.feedback.contains("ownership"));
    }

    #[tokio::test]
    async fn test_quality_scores() {
        let reasoner = HeuristicReasoner::new();
        let empty = reasoner
            .assess_quality(QualityRequest {
                task: "Explain borrowing",
                output: "   ",
            })
            .await
            .unwrap();
        assert_eq!(empty.score, 0.0);

        let good = reasoner
            .assess_quality(QualityRequest {
                task: "2+2",
                output: "4",
            })
            .await
            .unwrap();
        assert!(good.score >= 8.0, "score was {}", good.score);
        assert!(good.missing_elements.is_empty());

        let partial = reasoner
            .assess_quality(QualityRequest {
                task: "Explain borrowing and lifetimes",
                output: "Borrowing explained: it lets you reference data. Error: ran out of time",
            })
            .await
            .unwrap();
        assert!(partial.score < 8.0);
        assert_eq!(partial.missing_elements, vec!["lifetimes"]);
    }
}
