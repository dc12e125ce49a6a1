//! The automation-client capability consumed by the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chatpulse_core::types::{ChatSummary, MessageSummary};

/// Lifecycle events emitted by an automation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// An authentication challenge the user must scan.
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
}

impl ClientEvent {
    /// Short event name, as used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailure(_) => "auth_failure",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// Read operations against a live client session.
#[async_trait]
pub trait AutomationClient: Send + Sync + 'static {
    /// List every chat known to the session.
    async fn get_chats(&self) -> anyhow::Result<Vec<ChatSummary>>;

    /// The last `limit` messages of a chat, oldest first.
    async fn get_recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSummary>>;

    /// Release the underlying session. Called once when the owner is reset.
    async fn shutdown(&self) {}
}

/// A started client: the handle plus the stream of its lifecycle events.
pub struct ClientSession {
    pub client: Arc<dyn AutomationClient>,
    pub events: EventReceiver,
}

impl ClientSession {
    /// Build a session around `client`, returning the sender half for events.
    pub fn new(client: Arc<dyn AutomationClient>) -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { client, events: rx }, tx)
    }
}

/// Starts automation-client sessions. Launching begins the login flow;
/// progress is reported through [`ClientSession::events`].
#[async_trait]
pub trait ClientLauncher: Send + Sync + 'static {
    async fn launch(&self) -> anyhow::Result<ClientSession>;
}
