#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for overseer-router: analyzer + router + caches.

use async_trait::async_trait;
use overseer_agent::{
    AnalysisRequest, HeuristicReasoner, ProgressJudgement, ProgressRequest, QualityJudgement,
    QualityRequest, RawAnalysis, RawRoutingDecision, Reasoner, RoutingRequest,
};
use overseer_core::{
    ExecutionMode, OverseerError, OverseerResult, TeamRoster, ToolRegistry, TrainingExample,
    WorkerProfile,
};
use overseer_router::{
    LabeledFewShot, ModuleCache, ModuleState, Router, RoutingCache, StaticTraining, TaskAnalyzer,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Delegates to the heuristic reasoner, counting routing calls and
/// optionally replaying scripted routing answers first.
struct ScriptedReasoner {
    inner: HeuristicReasoner,
    script: Mutex<VecDeque<OverseerResult<RawRoutingDecision>>>,
    route_calls: AtomicU32,
    feedback_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedReasoner {
    fn new(script: Vec<OverseerResult<RawRoutingDecision>>) -> Self {
        Self {
            inner: HeuristicReasoner::new(),
            script: Mutex::new(script.into()),
            route_calls: AtomicU32::new(0),
            feedback_seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u32 {
        self.route_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> OverseerResult<RawAnalysis> {
        self.inner.analyze(request).await
    }

    async fn route(&self, request: RoutingRequest<'_>) -> OverseerResult<RawRoutingDecision> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        self.feedback_seen
            .lock()
            .push(request.feedback.map(str::to_string));
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(answer) => answer,
            None => self.inner.route(request).await,
        }
    }

    async fn judge_progress(&self, request: ProgressRequest<'_>) -> OverseerResult<ProgressJudgement> {
        self.inner.judge_progress(request).await
    }

    async fn assess_quality(&self, request: QualityRequest<'_>) -> OverseerResult<QualityJudgement> {
        self.inner.assess_quality(request).await
    }
}

struct Fixture {
    reasoner: Arc<ScriptedReasoner>,
    roster: Arc<TeamRoster>,
    analyzer: TaskAnalyzer,
    router: Router,
}

fn fixture(workers: Vec<WorkerProfile>, script: Vec<OverseerResult<RawRoutingDecision>>) -> Fixture {
    fixture_with_ttl(workers, script, Duration::from_secs(300))
}

fn fixture_with_ttl(
    workers: Vec<WorkerProfile>,
    script: Vec<OverseerResult<RawRoutingDecision>>,
    ttl: Duration,
) -> Fixture {
    let roster = Arc::new(TeamRoster::new(workers));
    let registry = Arc::new(ToolRegistry::from_roster(&roster, vec![]));
    let reasoner = Arc::new(ScriptedReasoner::new(script));
    let dyn_reasoner: Arc<dyn Reasoner> = reasoner.clone();
    let compiler = Arc::new(LabeledFewShot::new(
        4,
        Arc::clone(&dyn_reasoner),
        Arc::clone(&roster),
        Arc::clone(&registry),
    ));
    let router = Router::new(
        Arc::clone(&dyn_reasoner),
        Arc::clone(&registry),
        Arc::new(RoutingCache::new(ttl, 16)),
        Arc::new(ModuleCache::in_memory()),
        compiler,
        Arc::new(StaticTraining::default()),
    );
    Fixture {
        analyzer: TaskAnalyzer::new(dyn_reasoner, registry),
        reasoner,
        roster,
        router,
    }
}

fn raw(workers: &[&str], mode: &str) -> RawRoutingDecision {
    RawRoutingDecision {
        assigned_workers: workers.iter().map(|w| (*w).to_string()).collect(),
        execution_mode: Some(mode.to_string()),
        ..Default::default()
    }
}

// --- Scenarios ---

#[tokio::test]
async fn test_arithmetic_goes_to_analyst() {
    let f = fixture(
        vec![WorkerProfile::new("Analyst", "").with_tools(["code_execution"])],
        vec![],
    );
    let analysis = f.analyzer.analyze("2+2", None).await.unwrap();
    let decision = f.router.route("2+2", &analysis, &f.roster, None).await.unwrap();
    assert_eq!(decision.assigned_workers, vec!["Analyst"]);
    assert_eq!(decision.execution_mode, ExecutionMode::Delegated);
}

#[tokio::test]
async fn test_research_then_write_is_sequential() {
    let f = fixture(
        vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ],
        vec![],
    );
    let task = "Research X then write a report on X";
    let analysis = f.analyzer.analyze(task, None).await.unwrap();
    let decision = f.router.route(task, &analysis, &f.roster, None).await.unwrap();
    assert_eq!(decision.assigned_workers, vec!["Researcher", "Writer"]);
    assert_eq!(decision.execution_mode, ExecutionMode::Sequential);
}

// --- Routing cache ---

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let f = fixture(
        vec![WorkerProfile::new("Analyst", "").with_tools(["code_execution"])],
        vec![],
    );
    let analysis = f.analyzer.analyze("2+2", None).await.unwrap();
    let first = f.router.route("2+2", &analysis, &f.roster, None).await.unwrap();
    let second = f.router.route("2+2", &analysis, &f.roster, None).await.unwrap();

    assert_eq!(*first, *second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.reasoner.calls(), 1);
}

#[tokio::test]
async fn test_cache_expires_after_ttl() {
    let f = fixture_with_ttl(
        vec![WorkerProfile::new("Analyst", "").with_tools(["code_execution"])],
        vec![],
        Duration::from_millis(20),
    );
    let analysis = f.analyzer.analyze("2+2", None).await.unwrap();
    f.router.route("2+2", &analysis, &f.roster, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    f.router.route("2+2", &analysis, &f.roster, None).await.unwrap();
    assert_eq!(f.reasoner.calls(), 2);
}

#[tokio::test]
async fn test_feedback_bypasses_cache_and_refreshes_it() {
    let f = fixture(
        vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ],
        vec![],
    );
    let task = "Research X then write a report on X";
    let analysis = f.analyzer.analyze(task, None).await.unwrap();
    f.router.route(task, &analysis, &f.roster, None).await.unwrap();
    f.router
        .route(task, &analysis, &f.roster, Some("stalled twice"))
        .await
        .unwrap();
    assert_eq!(f.reasoner.calls(), 2);
    assert_eq!(
        f.reasoner.feedback_seen.lock().last().cloned().flatten().as_deref(),
        Some("stalled twice")
    );
}

// --- Backtracking ---

#[tokio::test]
async fn test_invalid_decision_is_retried_with_feedback() {
    let f = fixture(
        vec![
            WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
            WorkerProfile::new("Writer", ""),
        ],
        vec![
            Ok(raw(&["Ghost"], "delegated")),
            Ok(raw(&["Writer"], "parallel")),
            Ok(raw(&["Researcher", "Writer"], "parallel")),
        ],
    );
    let analysis = f.analyzer.analyze("do things", None).await.unwrap();
    let decision = f
        .router
        .route("do things", &analysis, &f.roster, None)
        .await
        .unwrap();
    assert_eq!(decision.execution_mode, ExecutionMode::Parallel);
    assert_eq!(f.reasoner.calls(), 3);

    let feedback = f.reasoner.feedback_seen.lock().clone();
    assert_eq!(feedback[0], None);
    assert!(feedback[1].as_deref().unwrap().contains("Ghost"));
    assert!(feedback[2].as_deref().unwrap().contains("parallel"));
}

#[tokio::test]
async fn test_exhausted_backtrack_budget_reports_last_decision() {
    let f = fixture(
        vec![WorkerProfile::new("Writer", "")],
        vec![
            Ok(raw(&["Ghost"], "delegated")),
            Err(OverseerError::Reasoning("garbled".into())),
            Ok(raw(&["Ghost"], "delegated")),
            Ok(raw(&["Phantom"], "delegated")),
        ],
    );
    let analysis = f.analyzer.analyze("do things", None).await.unwrap();
    let err = f
        .router
        .route("do things", &analysis, &f.roster, None)
        .await
        .unwrap_err();

    match err {
        OverseerError::Routing {
            message,
            last_decision,
        } => {
            assert!(message.contains("Phantom"));
            assert_eq!(last_decision.unwrap().assigned_workers, vec!["Phantom"]);
        }
        other => panic!("expected routing error, got {other}"),
    }
    assert_eq!(f.reasoner.calls(), 4);
    assert!(f.router.cache().is_empty());
}

#[tokio::test]
async fn test_decisions_respect_mode_and_roster_invariants() {
    let f = fixture(
        vec![
            WorkerProfile::new("Researcher", "Finds sources").with_tools(["web_search"]),
            WorkerProfile::new("Analyst", "Crunches numbers").with_tools(["code_execution"]),
            WorkerProfile::new("Writer", "Writes prose"),
        ],
        vec![],
    );
    let tasks = [
        "2+2",
        "Search the latest news and compute the average price",
        "Research rust, then compute benchmarks, and finally write a summary",
        "Say hello",
        "write a limerick",
    ];
    for task in tasks {
        let analysis = f.analyzer.analyze(task, None).await.unwrap();
        let decision = f.router.route(task, &analysis, &f.roster, None).await.unwrap();
        assert_eq!(
            decision.execution_mode == ExecutionMode::Delegated,
            decision.assigned_workers.len() == 1,
            "task {task:?} produced {decision:?}"
        );
        assert!(decision
            .assigned_workers
            .iter()
            .all(|w| f.roster.contains(w)));
    }
}

// --- Compiled module lifecycle ---

#[tokio::test]
async fn test_router_compiles_module_lazily() {
    let roster = Arc::new(TeamRoster::new(vec![
        WorkerProfile::new("Researcher", "").with_tools(["web_search"]),
        WorkerProfile::new("Writer", ""),
    ]));
    let registry = Arc::new(ToolRegistry::from_roster(&roster, vec![]));
    let reasoner: Arc<dyn Reasoner> = Arc::new(HeuristicReasoner::new());
    let modules = Arc::new(ModuleCache::in_memory());
    let training = Arc::new(StaticTraining(vec![TrainingExample {
        task: "Draft the quarterly newsletter".into(),
        team: String::new(),
        tools: String::new(),
        assigned_to: vec!["Researcher".into(), "Writer".into()],
        execution_mode: ExecutionMode::Sequential,
        tool_requirements: vec!["web_search".into()],
    }]));
    let router = Router::new(
        Arc::clone(&reasoner),
        Arc::clone(&registry),
        Arc::new(RoutingCache::new(Duration::from_secs(60), 8)),
        Arc::clone(&modules),
        Arc::new(LabeledFewShot::new(
            4,
            Arc::clone(&reasoner),
            Arc::clone(&roster),
            Arc::clone(&registry),
        )),
        training,
    );
    assert_eq!(modules.state(), ModuleState::Stale);

    let analyzer = TaskAnalyzer::new(reasoner, registry);
    let task = "Draft the quarterly newsletter";
    let analysis = analyzer.analyze(task, None).await.unwrap();
    let decision = router.route(task, &analysis, &roster, None).await.unwrap();

    assert_eq!(modules.state(), ModuleState::Fresh);
    assert_eq!(decision.assigned_workers, vec!["Researcher", "Writer"]);
    assert_eq!(decision.execution_mode, ExecutionMode::Sequential);
}
