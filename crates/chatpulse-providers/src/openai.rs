//! OpenAI Chat Completions API provider.
//!
//! Calls `/v1/chat/completions` without streaming. Groq exposes the same API
//! under `/openai`, which is the default for the brief.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chatpulse_core::config::BriefConfig;

use crate::{ChatCompletion, ChatMessage, CompletionRequest, CompletionResponse, Usage};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

pub struct OpenAiProvider {
    pub base_url: String,
    provider_id: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn openai(base_url: Option<&str>, api_key: impl Into<String>) -> Self {
        Self::with_id("openai", base_url.unwrap_or(OPENAI_BASE_URL), api_key)
    }

    pub fn groq(base_url: Option<&str>, api_key: impl Into<String>) -> Self {
        Self::with_id("groq", base_url.unwrap_or(GROQ_BASE_URL), api_key)
    }

    fn with_id(id: &str, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_id: id.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the provider for the brief, or `None` when no API key resolves.
    pub fn from_brief_config(config: &BriefConfig) -> Option<Self> {
        let api_key = config.resolve_api_key()?;
        let id = if config.base_url.contains("groq.com") {
            "groq"
        } else {
            "openai"
        };
        Some(Self::with_id(id, &config.base_url, api_key))
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait]
impl ChatCompletion for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let body = OpenAiRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model = %request.model, base_url = %self.base_url, "Calling chat completions");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error {status}: {body}", self.provider_id);
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from AI"))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "llama-3.3-70b-versatile".into(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: 100,
            temperature: Some(0.1),
        }
    }

    #[test]
    fn test_provider_creation() {
        let groq = OpenAiProvider::groq(None, "k");
        assert_eq!(groq.id(), "groq");
        assert_eq!(groq.base_url, GROQ_BASE_URL);

        let openai = OpenAiProvider::openai(Some("https://my-proxy.example.com/"), "k");
        assert_eq!(openai.id(), "openai");
        assert_eq!(openai.base_url, "https://my-proxy.example.com");
    }

    #[test]
    fn test_from_brief_config_requires_key() {
        let config = BriefConfig {
            api_key: None,
            api_key_env: Some("CP_TEST_UNSET_BRIEF_KEY".into()),
            ..BriefConfig::default()
        };
        assert!(OpenAiProvider::from_brief_config(&config).is_none());

        let config = BriefConfig {
            api_key: Some("gsk-1".into()),
            ..BriefConfig::default()
        };
        let provider = OpenAiProvider::from_brief_config(&config).unwrap();
        assert_eq!(provider.id(), "groq");
    }

    #[tokio::test]
    async fn test_complete_parses_content_and_usage() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "llama-3.3-70b-versatile");
                assert_eq!(body["messages"][0]["role"], "user");
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                }))
            }),
        );
        let base = serve(app).await;

        let provider = OpenAiProvider::openai(Some(&base), "test-key");
        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_complete_empty_choices_is_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = serve(app).await;

        let provider = OpenAiProvider::groq(Some(&base), "test-key");
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("No response"));
    }

    #[tokio::test]
    async fn test_complete_http_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;

        let provider = OpenAiProvider::groq(Some(&base), "test-key");
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
