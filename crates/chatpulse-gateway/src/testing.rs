//! Scripted automation clients for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use chatpulse_browser::{AutomationClient, ClientEvent, ClientLauncher, ClientSession, EventSender};
use chatpulse_core::types::{ChatSummary, MessageSummary};

pub fn chat(id: &str, unread: u32, timestamp: i64) -> ChatSummary {
    ChatSummary {
        id: id.into(),
        name: id.split('@').next().unwrap_or_default().to_uppercase(),
        is_group: id.ends_with("@g.us"),
        unread_count: unread,
        timestamp,
    }
}

pub struct FakeClient {
    chats: Vec<ChatSummary>,
    failure: Option<String>,
    calls: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeClient {
    pub fn with_chats(chats: Vec<ChatSummary>) -> Arc<Self> {
        Arc::new(Self {
            chats,
            failure: None,
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            chats: vec![],
            failure: Some(message.into()),
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationClient for FakeClient {
    async fn get_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(self.chats.clone()),
        }
    }

    async fn get_recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.chats.iter().any(|c| c.id == chat_id) {
            anyhow::bail!("Chat not found: {chat_id}");
        }
        let message = MessageSummary {
            id: format!("{chat_id}-m1"),
            body: "hello".into(),
            from: chat_id.into(),
            timestamp: 1,
            from_me: false,
        };
        Ok(vec![message].into_iter().take(limit).collect())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays `script` on every launch. Unless built with
/// [`FakeLauncher::dropping_events`], the event senders stay open so the
/// session lives until the test ends.
pub struct FakeLauncher {
    client: Arc<FakeClient>,
    script: Vec<ClientEvent>,
    launch_error: Option<String>,
    keep_senders: bool,
    senders: Mutex<Vec<EventSender>>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(client: Arc<FakeClient>, script: Vec<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            client,
            script,
            launch_error: None,
            keep_senders: true,
            senders: Mutex::new(vec![]),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn dropping_events(client: Arc<FakeClient>, script: Vec<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            keep_senders: false,
            ..Self::unwrap(Self::new(client, script))
        })
    }

    pub fn failing_launch(message: &str) -> Arc<Self> {
        Arc::new(Self {
            launch_error: Some(message.into()),
            ..Self::unwrap(Self::new(FakeClient::with_chats(vec![]), vec![]))
        })
    }

    fn unwrap(this: Arc<Self>) -> Self {
        Arc::try_unwrap(this).unwrap_or_else(|_| panic!("launcher already shared"))
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Send `event` to every session launched so far.
    pub fn emit(&self, event: ClientEvent) {
        for tx in self.senders.lock().iter() {
            let _ = tx.send(event.clone());
        }
    }
}

#[async_trait]
impl ClientLauncher for FakeLauncher {
    async fn launch(&self) -> anyhow::Result<ClientSession> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.launch_error {
            anyhow::bail!("{message}");
        }
        let (session, tx) = ClientSession::new(self.client.clone());
        for event in &self.script {
            tx.send(event.clone())?;
        }
        if self.keep_senders {
            self.senders.lock().push(tx);
        }
        Ok(session)
    }
}
