//! JavaScript evaluated inside the WhatsApp Web page, and parsers for
//! what it returns.
//!
//! The scripts read WhatsApp Web's own collections module, so they return
//! plain JSON in the shape of [`ChatSummary`] / [`MessageSummary`].

use serde::Deserialize;

use chatpulse_core::types::{ChatSummary, MessageSummary};

/// Reports the login screen state: the current QR payload (if shown) and
/// whether the chat list has loaded.
pub const PAGE_PROBE: &str = r#"(() => {
  const qrEl = document.querySelector('div[data-ref]');
  let collections = false;
  try {
    collections = !!(window.require && window.require('WAWebCollections').Chat);
  } catch (e) {}
  return {
    qr: qrEl ? qrEl.getAttribute('data-ref') : null,
    ready: !!document.querySelector('#pane-side') && collections,
  };
})()"#;

/// Lists every chat in the session.
pub const CHAT_LIST: &str = r#"(() => {
  const { Chat } = window.require('WAWebCollections');
  return Chat.getModelsArray().map((c) => ({
    id: c.id._serialized,
    name: c.formattedTitle || c.name || '',
    is_group: c.id.server === 'g.us',
    unread_count: Math.max(c.unreadCount || 0, 0),
    timestamp: c.t || 0,
  }));
})()"#;

/// Build the script that returns the last `limit` messages of `chat_id`,
/// or `null` when the chat is unknown.
///
/// `None` when `limit` is zero: `slice(-0)` would return every message.
pub fn recent_messages(chat_id: &str, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }
    // JSON string literals are valid JS string literals.
    let quoted = serde_json::Value::String(chat_id.to_string()).to_string();
    Some(format!(
        r#"(() => {{
  const {{ Chat }} = window.require('WAWebCollections');
  const chat = Chat.get({quoted});
  if (!chat) return null;
  return chat.msgs.getModelsArray()
    .filter((m) => !m.isNotification)
    .slice(-{limit})
    .map((m) => ({{
      id: m.id._serialized,
      body: m.body || '',
      from: (m.from && m.from._serialized) || '',
      timestamp: m.t || 0,
      from_me: !!m.id.fromMe,
    }}));
}})()"#
    ))
}

/// Result of [`PAGE_PROBE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageProbe {
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub ready: bool,
}

pub fn parse_probe(value: serde_json::Value) -> anyhow::Result<PageProbe> {
    let mut probe: PageProbe = serde_json::from_value(value)?;
    probe.qr = probe.qr.filter(|q| !q.is_empty());
    Ok(probe)
}

pub fn parse_chats(value: serde_json::Value) -> anyhow::Result<Vec<ChatSummary>> {
    Ok(serde_json::from_value(value)?)
}

pub fn parse_messages(chat_id: &str, value: serde_json::Value) -> anyhow::Result<Vec<MessageSummary>> {
    if value.is_null() {
        anyhow::bail!("Chat not found: {chat_id}");
    }
    Ok(serde_json::from_value(value)?)
}
