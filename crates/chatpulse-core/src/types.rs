use serde::{Deserialize, Serialize};

/// A chat as reported by the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Serialized platform id, e.g. `15551234567@c.us` or `1203630@g.us`.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: u32,
    /// Last activity, seconds since the Unix epoch. `0` when unknown.
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatSummary {
    /// The user part of the platform id (everything before `@`).
    pub fn user(&self) -> &str {
        self.id.split('@').next().unwrap_or_default()
    }

    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}

/// UI-facing chat record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub unread_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl From<&ChatSummary> for ChatData {
    fn from(chat: &ChatSummary) -> Self {
        let name = if chat.name.trim().is_empty() {
            "Unknown Contact".to_string()
        } else {
            chat.name.clone()
        };
        Self {
            id: chat.user().to_string(),
            name,
            is_group: chat.is_group,
            unread_count: chat.unread_count,
            timestamp: (chat.timestamp > 0).then_some(chat.timestamp),
        }
    }
}

/// Unread overview across all chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    /// Number of chats with at least one unread message.
    pub unread_count: usize,
    pub total_chats: usize,
}

impl UnreadCount {
    pub fn from_chats(chats: &[ChatSummary]) -> Self {
        Self {
            unread_count: chats.iter().filter(|c| c.has_unread()).count(),
            total_chats: chats.len(),
        }
    }
}

/// A single message inside a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub from_me: bool,
}

/// Sort chats newest first (unknown timestamps last) and keep at most `limit`.
pub fn latest_chats(chats: &[ChatSummary], limit: usize) -> Vec<ChatSummary> {
    let mut sorted = chats.to_vec();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(limit);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: &str, unread: u32, ts: i64) -> ChatSummary {
        ChatSummary {
            id: id.into(),
            name: format!("chat {id}"),
            is_group: false,
            unread_count: unread,
            timestamp: ts,
        }
    }

    #[test]
    fn test_unread_count_counts_chats_not_messages() {
        let chats = vec![chat("a@c.us", 0, 1), chat("b@c.us", 3, 2), chat("c@c.us", 0, 3)];
        let counts = UnreadCount::from_chats(&chats);
        assert_eq!(counts.unread_count, 1);
        assert_eq!(counts.total_chats, 3);
    }

    #[test]
    fn test_unread_count_serializes_camel_case() {
        let json = serde_json::to_value(UnreadCount {
            unread_count: 2,
            total_chats: 5,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"unreadCount": 2, "totalChats": 5}));
    }

    #[test]
    fn test_chat_data_from_summary() {
        let summary = ChatSummary {
            id: "15551234567@c.us".into(),
            name: "".into(),
            is_group: true,
            unread_count: 4,
            timestamp: 0,
        };
        let data = ChatData::from(&summary);
        assert_eq!(data.id, "15551234567");
        assert_eq!(data.name, "Unknown Contact");
        assert!(data.is_group);
        assert_eq!(data.timestamp, None);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["isGroup"], true);
        assert_eq!(json["unreadCount"], 4);
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_latest_chats_sorted_and_limited() {
        let chats: Vec<ChatSummary> = (0..15)
            .map(|i| chat(&format!("{i}@c.us"), 0, i as i64 * 10))
            .collect();
        let latest = latest_chats(&chats, 10);
        assert_eq!(latest.len(), 10);
        assert_eq!(latest[0].timestamp, 140);
        assert_eq!(latest[9].timestamp, 50);
    }

    #[test]
    fn test_latest_chats_unknown_timestamps_last() {
        let chats = vec![chat("a@c.us", 0, 0), chat("b@c.us", 0, 100)];
        let latest = latest_chats(&chats, 10);
        assert_eq!(latest[0].id, "b@c.us");
        assert_eq!(latest[1].id, "a@c.us");
    }
}
