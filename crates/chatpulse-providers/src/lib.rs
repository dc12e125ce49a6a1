//! LLM provider abstraction and the WhatsApp activity brief.
//!
//! The brief only needs single-shot chat completions, so providers implement
//! the small [`ChatCompletion`] trait rather than a streaming interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod brief;
pub mod openai;

pub use brief::{Brief, BriefGenerator, ChatWithMessages};
pub use openai::OpenAiProvider;

/// One message of a chat-completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The assistant's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
}

/// Single-shot chat completion.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Provider identifier (e.g., "groq", "openai").
    fn id(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse>;
}
