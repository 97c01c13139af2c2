use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Backend family of an LLM reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic messages API.
    Claude,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter, OpenAI-compatible.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible.
    Groq,
    /// Local Ollama server, OpenAI-compatible.
    Ollama,
}

/// Connection settings for an LLM-backed reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend family.
    pub provider: LlmProvider,
    /// Model identifier sent with every request.
    pub model_id: String,
    /// API key; may be empty for local servers.
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default base URL.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry policy for transient failures; the default when unset.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    /// A config with defaults for everything but the provider and model.
    pub fn new(provider: LlmProvider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_policy: None,
        }
    }

    /// Base URL to send requests to.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Ollama => "http://localhost:11434",
            }
        }
    }

    /// Whether the provider speaks the OpenAI chat completions dialect.
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self.provider, LlmProvider::Claude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_override() {
        let mut config = ModelConfig::new(LlmProvider::Groq, "llama");
        assert_eq!(config.base_url(), "https://api.groq.com/openai");
        config.api_base_url = Some("http://127.0.0.1:9000".into());
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert!(config.is_openai_compatible());
        assert!(!ModelConfig::new(LlmProvider::Claude, "c").is_openai_compatible());
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"provider":"ollama","model_id":"qwen","api_base_url":null}"#)
                .unwrap();
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.request_timeout_secs, 60);
        assert!(config.api_key.is_empty());
    }
}
