//! Gateway results shaped for HTTP and CLI callers.

use serde::{Deserialize, Serialize};
use serde_json::json;

use chatpulse_core::config::BriefConfig;
use chatpulse_core::types::{ChatData, UnreadCount, latest_chats};
use chatpulse_providers::brief::{Brief, BriefGenerator};
use chatpulse_providers::{ChatCompletion, ChatMessage, CompletionRequest, Usage};

use crate::gateway::{ClientGateway, GatewayResult};

pub const DEFAULT_LATEST_LIMIT: usize = 10;

pub const BRIEF_NOT_CONFIGURED: &str =
    "Brief provider not configured (set brief.api_key or GROQ_API_KEY)";

pub const COMPLETIONS_NOT_CONFIGURED: &str =
    "Chat completion provider not configured (set brief.api_key or GROQ_API_KEY)";

pub async fn unread(gateway: &ClientGateway) -> GatewayResult<UnreadCount> {
    gateway.unread_count().await
}

pub async fn chats(gateway: &ClientGateway) -> GatewayResult<Vec<ChatData>> {
    gateway
        .chats()
        .await
        .map(|chats| chats.iter().map(ChatData::from).collect())
}

/// The `limit` most recently active chats, newest first.
pub async fn latest(gateway: &ClientGateway, limit: usize) -> GatewayResult<Vec<ChatData>> {
    gateway
        .chats()
        .await
        .map(|chats| latest_chats(&chats, limit).iter().map(ChatData::from).collect())
}

pub async fn brief(
    gateway: &ClientGateway,
    generator: Option<&BriefGenerator>,
) -> GatewayResult<Brief> {
    let Some(generator) = generator else {
        return GatewayResult::error(BRIEF_NOT_CONFIGURED);
    };
    match gateway.brief_chats().await {
        GatewayResult::Ready { data } => match generator.generate(&data).await {
            Ok(brief) => GatewayResult::Ready { data: brief },
            Err(e) => GatewayResult::error(e.to_string()),
        },
        GatewayResult::WaitingForQr { qr } => GatewayResult::WaitingForQr { qr },
        GatewayResult::Error { error } => GatewayResult::Error { error },
    }
}

/// Body of a chat-completion request. `model` falls back to the brief model.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionParams {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Token counts in the camelCase shape the web UI reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<&Usage> for TokenUsage {
    fn from(usage: &Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Forward one chat completion and shape the reply like the upstream API,
/// plus a `tokenUsage` summary.
pub async fn complete(
    provider: Option<&dyn ChatCompletion>,
    defaults: &BriefConfig,
    params: CompletionParams,
) -> anyhow::Result<serde_json::Value> {
    let provider = provider.ok_or_else(|| anyhow::anyhow!(COMPLETIONS_NOT_CONFIGURED))?;
    let request = CompletionRequest {
        model: params
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| defaults.model.clone()),
        messages: params.messages,
        max_tokens: defaults.max_tokens,
        temperature: None,
    };
    let response = provider.complete(&request).await?;

    Ok(json!({
        "object": "chat.completion",
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": response.content},
        }],
        "usage": response.usage,
        "tokenUsage": TokenUsage::from(&response.usage),
    }))
}
