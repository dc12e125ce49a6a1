//! The automation-client gateway.
//!
//! One [`ClientGateway`] owns one automation-client session. Construction
//! starts the login flow in the background; every read operation waits for
//! the client to leave [`ClientState::Initializing`] and then dispatches on
//! the settled state, returning a [`GatewayResult`] instead of an error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use chatpulse_browser::{AutomationClient, ClientEvent, ClientLauncher, ClientSession};
use chatpulse_core::config::ClientConfig;
use chatpulse_core::types::{ChatSummary, MessageSummary, UnreadCount};
use chatpulse_providers::brief::{ChatWithMessages, MAX_BRIEF_MESSAGES, brief_candidates};

/// Lifecycle of the automation client.
#[derive(Clone)]
pub enum ClientState {
    Initializing,
    WaitingForQr { qr: String },
    Ready { client: Arc<dyn AutomationClient> },
    Failed { error: String },
}

impl ClientState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::WaitingForQr { .. } => "waiting_for_qr",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }
}

impl fmt::Debug for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => f.write_str("Initializing"),
            Self::WaitingForQr { qr } => f.debug_struct("WaitingForQr").field("qr", qr).finish(),
            Self::Ready { .. } => f.write_str("Ready"),
            Self::Failed { error } => f.debug_struct("Failed").field("error", error).finish(),
        }
    }
}

/// Outcome of a gateway operation, tagged by `status` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GatewayResult<T> {
    Ready { data: T },
    WaitingForQr { qr: String },
    Error { error: String },
}

impl<T> GatewayResult<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Transform the payload of a ready result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GatewayResult<U> {
        match self {
            Self::Ready { data } => GatewayResult::Ready { data: f(data) },
            Self::WaitingForQr { qr } => GatewayResult::WaitingForQr { qr },
            Self::Error { error } => GatewayResult::Error { error },
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// How long the client may stay initializing before the gateway fails it.
    pub init_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&ClientConfig> for GatewayOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            init_timeout: config.init_timeout(),
        }
    }
}

/// Stand-in deadline for ceilings too large to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Error stored when a gateway is shut down before its client failed.
pub const RESET_MESSAGE: &str = "Client gateway reset";

/// Compute the state that `event` leads to, or `None` when the event does
/// not apply to `current`.
pub fn next_state(
    current: &ClientState,
    event: &ClientEvent,
    client: &Arc<dyn AutomationClient>,
) -> Option<ClientState> {
    use ClientState::*;

    match (current, event) {
        (WaitingForQr { qr: old }, ClientEvent::Qr(qr)) if old == qr => None,
        (Initializing | WaitingForQr { .. }, ClientEvent::Qr(qr)) => {
            Some(WaitingForQr { qr: qr.clone() })
        }
        (Initializing | WaitingForQr { .. }, ClientEvent::Ready | ClientEvent::Authenticated) => {
            Some(Ready {
                client: client.clone(),
            })
        }
        (_, ClientEvent::AuthFailure(msg)) => Some(Failed {
            error: format!("Authentication failed: {msg}"),
        }),
        (_, ClientEvent::Disconnected(reason)) => Some(Failed {
            error: format!("Client disconnected: {reason}"),
        }),
        (Ready { .. }, ClientEvent::Ready | ClientEvent::Authenticated) => None,
        (Ready { .. } | Failed { .. }, ClientEvent::Qr(_))
        | (Failed { .. }, ClientEvent::Ready | ClientEvent::Authenticated) => {
            warn!(state = current.label(), event = event.name(), "Ignoring client event");
            None
        }
    }
}

/// State shared between the gateway and its background tasks.
struct Shared {
    state: watch::Sender<ClientState>,
    timeout_message: String,
    client: Mutex<Option<Arc<dyn AutomationClient>>>,
}

impl Shared {
    /// Decide and store the next state under the channel lock, so no other
    /// setter can slip in between reading the state and replacing it.
    /// Returns the new label when the state changed.
    fn transition(
        &self,
        decide: impl FnOnce(&ClientState) -> Option<ClientState>,
    ) -> Option<&'static str> {
        let mut changed = None;
        self.state.send_if_modified(|state| match decide(state) {
            Some(next) => {
                if let ClientState::Failed { error } = &next {
                    error!(%error, "Client failed");
                }
                changed = Some(next.label());
                *state = next;
                true
            }
            None => false,
        });
        if let Some(label) = changed {
            info!(state = label, "Client state changed");
            #[cfg(feature = "metrics")]
            crate::metrics::record_transition(label);
        }
        changed
    }

    fn handle_event(&self, event: &ClientEvent, client: &Arc<dyn AutomationClient>) {
        debug!(event = event.name(), "Client event");
        self.transition(|state| next_state(state, event, client));
    }

    /// Apply the timeout rule. No-op once the client has settled.
    fn fail_if_initializing(&self) {
        self.transition(|state| {
            state.is_initializing().then(|| ClientState::Failed {
                error: self.timeout_message.clone(),
            })
        });
    }
}

/// Owns one automation-client session and serializes access to it.
pub struct ClientGateway {
    shared: Arc<Shared>,
    deadline: Instant,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientGateway {
    /// Create the gateway and start initializing the client in the background.
    /// Must be called inside a tokio runtime.
    pub fn start(launcher: Arc<dyn ClientLauncher>, options: GatewayOptions) -> Arc<Self> {
        let (state, _) = watch::channel(ClientState::Initializing);
        let shared = Arc::new(Shared {
            state,
            timeout_message: format!(
                "Initialization timeout after {} seconds",
                options.init_timeout.as_secs()
            ),
            client: Mutex::new(None),
        });
        let now = Instant::now();
        let deadline = now
            .checked_add(options.init_timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);

        let driver = tokio::spawn(drive(shared.clone(), launcher));
        let watchdog = {
            let shared = shared.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                shared.fail_if_initializing();
            })
        };

        Arc::new(Self {
            shared,
            deadline,
            tasks: Mutex::new(vec![driver, watchdog]),
        })
    }

    /// Snapshot of the current state, without waiting.
    pub fn state(&self) -> ClientState {
        self.shared.state.borrow().clone()
    }

    /// Label of the current state, without waiting.
    pub fn status(&self) -> &'static str {
        self.shared.state.borrow().label()
    }

    /// Wait until the client leaves `Initializing` or the deadline passes.
    async fn settled(&self) -> ClientState {
        let mut rx = self.shared.state.subscribe();
        let waited =
            tokio::time::timeout_at(self.deadline, rx.wait_for(|s| !s.is_initializing())).await;
        match waited {
            Ok(Ok(state)) => (*state).clone(),
            Ok(Err(_)) => self.state(),
            Err(_) => {
                self.shared.fail_if_initializing();
                self.state()
            }
        }
    }

    /// Run `operation` against the live client once it has settled.
    ///
    /// A failing operation yields an error result but leaves the lifecycle
    /// state untouched.
    pub async fn with_client<T, F, Fut>(&self, operation: &'static str, op: F) -> GatewayResult<T>
    where
        F: FnOnce(Arc<dyn AutomationClient>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        debug!(operation, "Waiting for client");
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = match self.settled().await {
            ClientState::Ready { client } => match op(client).await {
                Ok(data) => GatewayResult::Ready { data },
                Err(e) => {
                    warn!(operation, %e, "Client operation failed");
                    GatewayResult::error(e.to_string())
                }
            },
            ClientState::WaitingForQr { qr } => GatewayResult::WaitingForQr { qr },
            ClientState::Failed { error } => GatewayResult::Error { error },
            ClientState::Initializing => GatewayResult::error("Client in unknown state"),
        };

        #[cfg(feature = "metrics")]
        crate::metrics::record_operation(
            operation,
            outcome_label(&result),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    /// Count chats with unread messages.
    pub async fn unread_count(&self) -> GatewayResult<UnreadCount> {
        self.with_client("unread_count", |client| async move {
            let chats = client.get_chats().await?;
            Ok(UnreadCount::from_chats(&chats))
        })
        .await
    }

    /// The full chat list, unshaped.
    pub async fn chats(&self) -> GatewayResult<Vec<ChatSummary>> {
        self.with_client("chats", |client| async move { client.get_chats().await })
            .await
    }

    /// The last `limit` messages of one chat.
    pub async fn recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> GatewayResult<Vec<MessageSummary>> {
        let chat_id = chat_id.to_string();
        self.with_client("recent_messages", |client| async move {
            client.get_recent_messages(&chat_id, limit).await
        })
        .await
    }

    /// Chats worth briefing, each with its recent messages.
    pub async fn brief_chats(&self) -> GatewayResult<Vec<ChatWithMessages>> {
        self.with_client("brief_chats", |client| async move {
            let chats = client.get_chats().await?;
            let mut out = Vec::new();
            for chat in brief_candidates(&chats) {
                let messages = client
                    .get_recent_messages(&chat.id, MAX_BRIEF_MESSAGES)
                    .await?;
                out.push(ChatWithMessages { chat, messages });
            }
            Ok(out)
        })
        .await
    }

    /// Stop background tasks and release the client session. Callers still
    /// waiting on this gateway resolve with [`RESET_MESSAGE`].
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.transition(|state| match state {
            ClientState::Failed { .. } => None,
            _ => Some(ClientState::Failed {
                error: RESET_MESSAGE.to_string(),
            }),
        });
        if let Some(client) = self.shared.client.lock().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { client.shutdown().await });
                }
                Err(_) => warn!("No runtime available to shut down the client session"),
            }
        }
        info!("Client gateway shut down");
    }
}

impl Drop for ClientGateway {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(feature = "metrics")]
fn outcome_label<T>(result: &GatewayResult<T>) -> &'static str {
    match result {
        GatewayResult::Ready { .. } => "ready",
        GatewayResult::WaitingForQr { .. } => "waiting_for_qr",
        GatewayResult::Error { .. } => "error",
    }
}

/// Launch the client and apply its lifecycle events until the stream ends.
async fn drive(shared: Arc<Shared>, launcher: Arc<dyn ClientLauncher>) {
    info!("Initializing automation client");
    let ClientSession { client, mut events } = match launcher.launch().await {
        Ok(session) => session,
        Err(e) => {
            error!(%e, "Client initialization failed");
            shared.transition(|state| {
                state.is_initializing().then(|| ClientState::Failed {
                    error: e.to_string(),
                })
            });
            return;
        }
    };
    *shared.client.lock() = Some(client.clone());

    while let Some(event) = events.recv().await {
        shared.handle_event(&event, &client);
    }

    let closed = ClientEvent::Disconnected("event stream closed".into());
    shared.transition(|state| match state {
        ClientState::Failed { .. } => None,
        _ => next_state(state, &closed, &client),
    });
}
