//! Activity brief: asks a hosted model to triage recent WhatsApp activity.
//!
//! This module only shapes the model's input (chat context and prompt) and
//! output (robust JSON extraction); the analysis itself is the model's.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use chatpulse_core::config::BriefConfig;
use chatpulse_core::types::{ChatSummary, MessageSummary, latest_chats};

use crate::{ChatCompletion, ChatMessage, CompletionRequest};

/// Chats included in a brief.
pub const MAX_BRIEF_CHATS: usize = 10;
/// Messages per chat included in a brief.
pub const MAX_BRIEF_MESSAGES: usize = 10;

/// A chat together with its recent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatWithMessages {
    pub chat: ChatSummary,
    pub messages: Vec<MessageSummary>,
}

/// The triaged result shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub summary: String,
    pub urgent_items: Vec<String>,
    pub can_ignore: Vec<String>,
    pub key_insights: Vec<String>,
    pub total_unread: u64,
    pub generated_at: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelBrief {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    urgent_items: Vec<String>,
    #[serde(default)]
    can_ignore: Vec<String>,
    #[serde(default)]
    key_insights: Vec<String>,
}

/// Pick the chats worth briefing: those with unread messages, newest first,
/// or the latest chats when nothing is unread.
pub fn brief_candidates(chats: &[ChatSummary]) -> Vec<ChatSummary> {
    let unread: Vec<ChatSummary> = chats.iter().filter(|c| c.has_unread()).cloned().collect();
    if unread.is_empty() {
        latest_chats(chats, MAX_BRIEF_CHATS)
    } else {
        latest_chats(&unread, MAX_BRIEF_CHATS)
    }
}

fn iso_from_epoch(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// JSON context handed to the model.
pub fn build_context(now: DateTime<Utc>, chats: &[ChatWithMessages]) -> serde_json::Value {
    let total_unread: u64 = chats.iter().map(|c| u64::from(c.chat.unread_count)).sum();
    let entries: Vec<serde_json::Value> = chats
        .iter()
        .map(|c| {
            let sender = if c.chat.is_group { "group_member" } else { "contact" };
            let recent: Vec<serde_json::Value> = c
                .messages
                .iter()
                .rev()
                .take(MAX_BRIEF_MESSAGES)
                .map(|m| {
                    json!({
                        "content": m.body,
                        "from": if m.from_me { "me" } else { sender },
                        "timestamp": iso_from_epoch(m.timestamp),
                        "isFromMe": m.from_me,
                    })
                })
                .collect();
            json!({
                "name": if c.chat.name.is_empty() { "Unknown Contact" } else { c.chat.name.as_str() },
                "type": if c.chat.is_group { "group" } else { "individual" },
                "unreadCount": c.chat.unread_count,
                "lastActivity": iso_from_epoch(c.chat.timestamp),
                "recentMessages": recent,
            })
        })
        .collect();

    json!({
        "currentTime": now.to_rfc3339(),
        "totalChats": chats.len(),
        "totalUnread": total_unread,
        "chats": entries,
    })
}

/// The analysis prompt.
pub fn build_prompt(now: DateTime<Utc>, context: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    format!(
        r#"You are an AI assistant that analyzes WhatsApp activity to create concise, actionable briefs.

Current time: {now}

WHATSAPP DATA:
{pretty}

Please analyze this WhatsApp data and create a brief that includes:

1. **SUMMARY**: A 2-3 sentence overview of current WhatsApp activity
2. **NEEDS ATTENTION**: Specific items that require immediate action or response (be specific about who and what)
3. **CAN IGNORE**: Items that are low priority or informational only
4. **KEY INSIGHTS**: Patterns or important context (time-sensitive messages, group activity, etc.)

Guidelines:
- Be concise but specific
- Focus on actionable insights
- Identify time-sensitive matters
- Distinguish between urgent and casual conversations
- Consider message recency and sender importance
- For group chats, note if there's relevant discussion
- If someone is trying to reach me multiple times, highlight that
- Consider context clues (words like "urgent", "important", "please call", etc.)

CRITICAL: Your response must be ONLY a valid JSON object. Do not include any markdown formatting, explanations, or code blocks. Return only the raw JSON with these exact fields:
- summary: string
- urgentItems: string[]
- canIgnore: string[]
- keyInsights: string[]

Keep each item concise (1-2 sentences max).

Example format (return only the JSON, nothing else):
{{"summary":"Your summary here","urgentItems":["Item 1","Item 2"],"canIgnore":["Item 1"],"keyInsights":["Insight 1"]}}"#,
        now = now.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Pull a JSON object out of a model reply: the whole text, a fenced code
/// block, or the outermost `{...}` span, in that order.
pub fn extract_json(text: &str) -> anyhow::Result<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let fenced = regex::Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```")?;
    if let Some(caps) = fenced.captures(trimmed) {
        return serde_json::from_str(&caps[1])
            .map_err(|_| anyhow::anyhow!("Invalid JSON in code block"));
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&trimmed[start..=end])
            .map_err(|_| anyhow::anyhow!("Could not extract valid JSON from response")),
        _ => anyhow::bail!("No valid JSON found in response"),
    }
}

/// Generates [`Brief`]s through a chat-completion provider.
pub struct BriefGenerator {
    provider: Arc<dyn ChatCompletion>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl BriefGenerator {
    pub fn new(provider: Arc<dyn ChatCompletion>, config: &BriefConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub async fn generate(&self, chats: &[ChatWithMessages]) -> anyhow::Result<Brief> {
        self.generate_at(Utc::now(), chats).await
    }

    pub async fn generate_at(
        &self,
        now: DateTime<Utc>,
        chats: &[ChatWithMessages],
    ) -> anyhow::Result<Brief> {
        let context = build_context(now, chats);
        let total_unread = context["totalUnread"].as_u64().unwrap_or_default();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(build_prompt(now, &context))],
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        };

        debug!(provider = self.provider.id(), chats = chats.len(), "Generating brief");
        let response = self.provider.complete(&request).await.map_err(|e| {
            warn!(%e, "Brief generation failed");
            anyhow::anyhow!("Failed to generate brief: {e}")
        })?;

        let parsed: ModelBrief = extract_json(&response.content)
            .and_then(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .map_err(|e| anyhow::anyhow!("Failed to generate brief: {e}"))?;

        Ok(Brief {
            summary: parsed
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "No summary available".to_string()),
            urgent_items: parsed.urgent_items,
            can_ignore: parsed.can_ignore,
            key_insights: parsed.key_insights,
            total_unread,
            generated_at: now.to_rfc3339(),
        })
    }
}
