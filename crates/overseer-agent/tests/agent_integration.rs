#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for overseer-agent: LLM reasoner and HTTP worker runtime
//! against a mock server.

use overseer_agent::{
    AnalysisRequest, CompiledModule, HttpWorkerRuntime, LlmProvider, LlmReasoner, ModelConfig,
    QualityRequest, Reasoner, RetryPolicy, RoutingRequest, WorkerRuntime,
};
use overseer_core::{
    Complexity, ExecutionFault, TaskAnalysis, TeamRoster, ToolRegistry, WorkerProfile,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn model_config(server: &MockServer, provider: LlmProvider) -> ModelConfig {
    let mut config = ModelConfig::new(provider, "test-model");
    config.api_key = "sk-test".into();
    config.api_base_url = Some(server.uri());
    config.retry_policy = Some(RetryPolicy {
        max_retries: 2,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
    });
    config
}

fn openai_reply(content: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

fn team() -> (TeamRoster, ToolRegistry) {
    let roster = TeamRoster::new(vec![
        WorkerProfile::new("Researcher", "Finds sources").with_tools(["web_search"]),
        WorkerProfile::new("Writer", "Writes reports"),
    ]);
    let registry = ToolRegistry::from_roster(&roster, vec![]);
    (roster, registry)
}

// --- LlmReasoner ---

#[tokio::test]
async fn test_llm_analyze_parses_fenced_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(
            "```json\n{\"complexity\": \"complex\", \"required_capabilities\": [\"web_search\"], \"estimated_steps\": 3}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (_, registry) = team();
    let reasoner = LlmReasoner::new(model_config(&server, LlmProvider::OpenAi)).unwrap();
    let raw = reasoner
        .analyze(AnalysisRequest {
            task: "Research rust then write a report",
            context: None,
            registry: &registry,
        })
        .await
        .unwrap();

    assert_eq!(raw.complexity.as_deref(), Some("complex"));
    assert_eq!(raw.required_capabilities, vec!["web_search"]);
    assert_eq!(raw.estimated_steps, Some(3));
}

#[tokio::test]
async fn test_llm_route_sends_feedback_and_demos() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "test-model"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(
            r#"{"assigned_workers": ["Researcher", "Writer"], "execution_mode": "sequential", "subtasks": null, "tool_requirements": ["web_search"], "ordered": true}"#,
        )))
        .mount(&server)
        .await;

    let (roster, registry) = team();
    let analysis = TaskAnalysis::new(Complexity::Moderate, vec!["web_search".into()], 2);
    let module = CompiledModule::baseline("labeled_fewshot", "hash");
    let reasoner = LlmReasoner::new(model_config(&server, LlmProvider::OpenAi)).unwrap();

    let raw = reasoner
        .route(RoutingRequest {
            task: "Research X then write a report on X",
            analysis: &analysis,
            roster: &roster,
            registry: &registry,
            module: &module,
            feedback: Some("unknown worker 'Ghost'"),
        })
        .await
        .unwrap();
    assert_eq!(raw.assigned_workers, vec!["Researcher", "Writer"]);
    assert!(raw.ordered);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("unknown worker 'Ghost'"));
    assert!(user.contains("- Researcher: Finds sources"));
}

#[tokio::test]
async fn test_llm_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "busy"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_reply(r#"{"score": 9}"#)),
        )
        .mount(&server)
        .await;

    let reasoner = LlmReasoner::new(model_config(&server, LlmProvider::Groq)).unwrap();
    let judgement = reasoner
        .assess_quality(QualityRequest {
            task: "2+2",
            output: "4",
        })
        .await
        .unwrap();
    assert_eq!(judgement.score, 9.0);
}

#[tokio::test]
async fn test_llm_claude_dialect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "{\"score\": 6.5, \"missing_elements\": [\"sources\"]}"}]
        })))
        .mount(&server)
        .await;

    let reasoner = LlmReasoner::new(model_config(&server, LlmProvider::Claude)).unwrap();
    let judgement = reasoner
        .assess_quality(QualityRequest {
            task: "Write a cited report",
            output: "A report.",
        })
        .await
        .unwrap();
    assert_eq!(judgement.score, 6.5);
    assert_eq!(judgement.missing_elements, vec!["sources"]);
}

#[tokio::test]
async fn test_llm_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "bad"})))
        .expect(1)
        .mount(&server)
        .await;

    let reasoner = LlmReasoner::new(model_config(&server, LlmProvider::OpenAi)).unwrap();
    let err = reasoner
        .assess_quality(QualityRequest {
            task: "t",
            output: "o",
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"));
}

// --- HttpWorkerRuntime ---

#[tokio::test]
async fn test_http_worker_posts_task_and_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(serde_json::json!({
            "worker": "Writer",
            "task": "write it",
            "context": "notes"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"output": "the report"})),
        )
        .mount(&server)
        .await;

    let runtime = HttpWorkerRuntime::new()
        .with_default_endpoint(format!("{}/invoke", server.uri()))
        .with_retry_policy(RetryPolicy::none());
    let output = runtime
        .invoke("Writer", "write it", Some("notes"))
        .await
        .unwrap();
    assert_eq!(output, "the report");
}

#[tokio::test]
async fn test_http_worker_failure_becomes_fault() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let runtime = HttpWorkerRuntime::new()
        .with_endpoint("Researcher", server.uri())
        .with_retry_policy(RetryPolicy::none());
    let fault = runtime.invoke("Researcher", "search", None).await.unwrap_err();
    assert_eq!(fault.worker(), "Researcher");
    assert!(fault.to_string().contains("boom"));

    let missing = runtime.invoke("Writer", "write", None).await.unwrap_err();
    assert!(matches!(missing, ExecutionFault::Failed { .. }));
    assert!(missing.to_string().contains("no endpoint"));
}
