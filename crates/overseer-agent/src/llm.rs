use crate::config::{LlmProvider, ModelConfig};
use crate::reasoner::{
    AnalysisRequest, ProgressJudgement, ProgressRequest, QualityJudgement, QualityRequest,
    RawAnalysis, RawRoutingDecision, Reasoner, RoutingRequest,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::text;
use async_trait::async_trait;
use overseer_core::{OverseerError, OverseerResult};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Longest worker output quoted back to the model.
const MAX_QUOTED_CHARS: usize = 8_000;

const ANALYZE_PROMPT: &str = "You classify tasks for a team of workers. Reply with a single JSON \
object: {\"complexity\": \"simple\"|\"moderate\"|\"complex\", \"required_capabilities\": [..], \
\"estimated_steps\": <integer>}. Use only capability tags from the catalog.";

const PROGRESS_PROMPT: &str = "You judge whether a team's output completes a task. Reply with a \
single JSON object: {\"complete\": bool, \"made_progress\": bool, \"feedback\": \"...\"}. \
`made_progress` is false when the output did not improve on the previous one.";

const QUALITY_PROMPT: &str = "You grade answers on a 0-10 scale. Reply with a single JSON object: \
{\"score\": <number>, \"missing_elements\": [..], \"improvement_suggestions\": \"...\"}.";

const ROUTING_FORMAT: &str = "Reply with a single JSON object: {\"assigned_workers\": [..], \
\"execution_mode\": \"delegated\"|\"sequential\"|\"parallel\", \"subtasks\": [..] or null, \
\"tool_requirements\": [..], \"ordered\": bool}.";

/// A [`Reasoner`] backed by a chat-completion API.
///
/// Every call sends one system and one user message and expects a JSON
/// object back, possibly wrapped in prose or a fenced code block.
pub struct LlmReasoner {
    config: ModelConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl LlmReasoner {
    /// Build the HTTP client for `config`.
    pub fn new(config: ModelConfig) -> OverseerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OverseerError::Http(e.to_string()))?;
        let retry = config.retry_policy.clone().unwrap_or_default();
        Ok(Self { config, http, retry })
    }

    /// Model identifier in use.
    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn complete(&self, system: &str, user: &str) -> OverseerResult<String> {
        with_retry(&self.retry, &self.config.model_id, || self.send(system, user)).await
    }

    async fn send(&self, system: &str, user: &str) -> OverseerResult<String> {
        let (url, body) = if self.config.is_openai_compatible() {
            (
                format!("{}/v1/chat/completions", self.config.base_url()),
                serde_json::json!({
                    "model": self.config.model_id,
                    "max_tokens": self.config.max_tokens,
                    "temperature": self.config.temperature,
                    "messages": [
                        {"role": "system", "content": system},
                        {"role": "user", "content": user},
                    ],
                }),
            )
        } else {
            (
                format!("{}/v1/messages", self.config.base_url()),
                serde_json::json!({
                    "model": self.config.model_id,
                    "max_tokens": self.config.max_tokens,
                    "temperature": self.config.temperature,
                    "system": system,
                    "messages": [{"role": "user", "content": user}],
                }),
            )
        };

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| OverseerError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OverseerError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(OverseerError::Http(format!(
                "LLM API error {}: {}",
                status, resp_body
            )));
        }

        let content = if self.config.is_openai_compatible() {
            parse_openai_content(&resp_body)
        } else {
            parse_claude_content(&resp_body)
        };
        content.ok_or_else(|| {
            OverseerError::Reasoning(format!("response carried no text: {resp_body}"))
        })
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        match self.config.provider {
            LlmProvider::Claude => request
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01"),
            LlmProvider::OpenRouter => request
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("X-Title", "Overseer"),
            LlmProvider::Ollama if self.config.api_key.is_empty() => request,
            _ => request.header("Authorization", format!("Bearer {}", self.config.api_key)),
        }
    }

    async fn ask<T: DeserializeOwned>(&self, system: &str, user: &str) -> OverseerResult<T> {
        let reply = self.complete(system, user).await?;
        debug!(model = %self.config.model_id, reply = %text::preview(&reply, 200), "LLM reply");
        extract_json(&reply)
    }
}

/// Text of the first choice of an OpenAI chat completion.
pub fn parse_openai_content(body: &serde_json::Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

/// Concatenated text blocks of an Anthropic messages response.
pub fn parse_claude_content(body: &serde_json::Value) -> Option<String> {
    let blocks = body["content"].as_array()?;
    let text: String = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse the first JSON object found in a model reply.
///
/// Accepts bare JSON, fenced code blocks and JSON surrounded by prose.
pub fn extract_json<T: DeserializeOwned>(reply: &str) -> OverseerResult<T> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = trimmed
        .split("```")
        .nth(1)
        .map(|block| block.trim_start_matches("json").trim());
    if let Some(block) = unfenced {
        if let Ok(value) = serde_json::from_str(block) {
            return Ok(value);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| OverseerError::Reasoning(format!("malformed JSON in reply: {e}"))),
        _ => Err(OverseerError::Reasoning(format!(
            "no JSON object in reply: {}",
            text::preview(trimmed, 120)
        ))),
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn analyze(&self, request: AnalysisRequest<'_>) -> OverseerResult<RawAnalysis> {
        let mut user = format!(
            "Capability catalog:\n{}\n\nTask: {}",
            request.registry.describe(),
            request.task
        );
        if let Some(context) = request.context {
            user.push_str(&format!(
                "\n\nContext:\n{}",
                text::preview(context, MAX_QUOTED_CHARS)
            ));
        }
        self.ask(ANALYZE_PROMPT, &user).await
    }

    async fn route(&self, request: RoutingRequest<'_>) -> OverseerResult<RawRoutingDecision> {
        let mut system = format!("{}\n{}", request.module.instructions, ROUTING_FORMAT);
        if !request.module.demos.is_empty() {
            system.push_str("\n\nExamples:\n");
            system.push_str(&request.module.render_demos());
        }

        let mut user = format!(
            "Workers:\n{}\n\nTools:\n{}\n\nAnalysis: {}\n\nTask: {}",
            request.roster.describe(),
            request.registry.describe(),
            request.analysis.summary(),
            request.task
        );
        if let Some(feedback) = request.feedback {
            user.push_str(&format!("\n\nA previous decision was rejected: {feedback}"));
        }
        self.ask(&system, &user).await
    }

    async fn judge_progress(&self, request: ProgressRequest<'_>) -> OverseerResult<ProgressJudgement> {
        let mut user = format!(
            "Task: {}\n\nLatest output:\n{}",
            request.task,
            text::preview(request.output, MAX_QUOTED_CHARS)
        );
        if let Some(previous) = request.previous_output {
            user.push_str(&format!(
                "\n\nPrevious output:\n{}",
                text::preview(previous, MAX_QUOTED_CHARS)
            ));
        }
        if !request.failed_workers.is_empty() {
            user.push_str(&format!(
                "\n\nFailed workers: {}",
                request.failed_workers.join(", ")
            ));
        }
        user.push_str(&format!(
            "\n\nIterations left: {}",
            request.remaining_iterations
        ));
        self.ask(PROGRESS_PROMPT, &user).await
    }

    async fn assess_quality(&self, request: QualityRequest<'_>) -> OverseerResult<QualityJudgement> {
        let user = format!(
            "Task: {}\n\nAnswer:\n{}",
            request.task,
            text::preview(request.output, MAX_QUOTED_CHARS)
        );
        self.ask(QUALITY_PROMPT, &user).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_variants() {
        let bare: RawAnalysis =
            extract_json(r#"{"complexity":"simple","required_capabilities":[],"estimated_steps":1}"#)
                .unwrap();
        assert_eq!(bare.complexity.as_deref(), Some("simple"));

        let fenced: QualityJudgement =
            extract_json("Here you go:\n```json\n{\"score\": 7.5}\n```").unwrap();
        assert_eq!(fenced.score, 7.5);

        let prose: ProgressJudgement = extract_json(
            "Sure. {\"complete\": true, \"made_progress\": true, \"feedback\": \"ok\"} Done.",
        )
        .unwrap();
        assert!(prose.complete);

        let err = extract_json::<RawAnalysis>("no json here").unwrap_err();
        assert!(matches!(err, OverseerError::Reasoning(_)));
    }

    #[test]
    fn test_parse_content() {
        let openai = serde_json::json!({"choices":[{"message":{"content":"hi"}}]});
        assert_eq!(parse_openai_content(&openai).as_deref(), Some("hi"));

        let claude = serde_json::json!({"content":[
            {"type":"text","text":"a"},
            {"type":"tool_use","id":"x"},
            {"type":"text","text":"b"}
        ]});
        assert_eq!(parse_claude_content(&claude).as_deref(), Some("ab"));
        assert!(parse_claude_content(&serde_json::json!({"content": []})).is_none());
    }
}
