//! WhatsApp Web driven through Chrome/Chromium over CDP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatpulse_core::config::ClientConfig;
use chatpulse_core::types::{ChatSummary, MessageSummary};

use crate::client::{AutomationClient, ClientEvent, ClientLauncher, ClientSession, EventSender};
use crate::scripts;

// WhatsApp Web refuses the default headless user agent.
const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Launches a browser with a persistent profile and opens WhatsApp Web.
pub struct WebClientLauncher {
    config: ClientConfig,
}

impl WebClientLauncher {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self) -> anyhow::Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(self.config.resolve_profile_dir())
            .arg(format!("--user-agent={DESKTOP_USER_AGENT}"));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {e}"))
    }
}

#[async_trait]
impl ClientLauncher for WebClientLauncher {
    async fn launch(&self) -> anyhow::Result<ClientSession> {
        tokio::fs::create_dir_all(self.config.resolve_profile_dir()).await?;

        let (browser, mut handler) = Browser::launch(self.browser_config()?).await?;
        info!(headless = self.config.headless, "Browser launched");

        let (closed_tx, closed_rx) = oneshot::channel();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(%e, "CDP handler error");
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        let page = browser.new_page(self.config.url.as_str()).await?;
        info!(url = %self.config.url, "Opened messaging page");

        let client = Arc::new(WebClient {
            page: page.clone(),
            browser: Mutex::new(Some(browser)),
            handler_task,
        });
        let (session, events) = ClientSession::new(client);

        tokio::spawn(watch_page(
            page,
            events,
            self.config.poll_interval(),
            self.config.qr_max_retries,
            closed_rx,
        ));

        Ok(session)
    }
}

/// A live WhatsApp Web page.
struct WebClient {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl AutomationClient for WebClient {
    async fn get_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        let value = self
            .page
            .evaluate(scripts::CHAT_LIST)
            .await?
            .into_value::<serde_json::Value>()?;
        scripts::parse_chats(value)
    }

    async fn get_recent_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<MessageSummary>> {
        let Some(script) = scripts::recent_messages(chat_id, limit) else {
            return Ok(Vec::new());
        };
        let value = self
            .page
            .evaluate(script)
            .await?
            .into_value::<serde_json::Value>()?;
        scripts::parse_messages(chat_id, value)
    }

    async fn shutdown(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!(%e, "Failed to close browser");
            }
            if let Err(e) = browser.wait().await {
                warn!(%e, "Failed to wait for browser exit");
            }
        }
        self.handler_task.abort();
        debug!("Browser session shut down");
    }
}

/// Probe the page on an interval and translate what it shows into
/// lifecycle events. Returns once the session is over or nobody listens.
async fn watch_page(
    page: Page,
    events: EventSender,
    interval: Duration,
    qr_max_retries: u32,
    mut closed: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_qr: Option<String> = None;
    let mut qr_seen = 0u32;
    let mut ready = false;

    loop {
        tokio::select! {
            _ = &mut closed => {
                let _ = events.send(ClientEvent::Disconnected("browser connection closed".into()));
                return;
            }
            _ = ticker.tick() => {}
        }
        if events.is_closed() {
            return;
        }

        let probe = match page.evaluate(scripts::PAGE_PROBE).await {
            Ok(result) => match result
                .into_value::<serde_json::Value>()
                .map_err(anyhow::Error::from)
                .and_then(scripts::parse_probe)
            {
                Ok(probe) => probe,
                Err(e) => {
                    debug!(%e, "Unreadable page probe");
                    continue;
                }
            },
            // The page may be mid-navigation; try again on the next tick.
            Err(e) => {
                debug!(%e, "Page probe failed");
                continue;
            }
        };

        if ready {
            if probe.qr.is_some() {
                let _ = events.send(ClientEvent::Disconnected("logged out".into()));
                return;
            }
            continue;
        }

        if probe.ready {
            ready = true;
            let _ = events.send(ClientEvent::Authenticated);
            let _ = events.send(ClientEvent::Ready);
            continue;
        }

        if let Some(qr) = probe.qr {
            if last_qr.as_deref() == Some(qr.as_str()) {
                continue;
            }
            qr_seen += 1;
            if qr_max_retries > 0 && qr_seen > qr_max_retries {
                let _ = events.send(ClientEvent::Disconnected(
                    "Max qrcode retries reached".into(),
                ));
                return;
            }
            let _ = events.send(ClientEvent::Qr(qr.clone()));
            last_qr = Some(qr);
        }
    }
}
