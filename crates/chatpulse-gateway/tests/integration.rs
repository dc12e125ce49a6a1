//! Gateway integration tests: start the real HTTP server over a scripted
//! automation client and interact with it via HTTP.
//!
//! Run with: `cargo test -p chatpulse-gateway --test integration`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use chatpulse_browser::{AutomationClient, ClientEvent, ClientLauncher, ClientSession, EventSender};
use chatpulse_core::assistant::AssistantStore;
use chatpulse_core::config::Config;
use chatpulse_core::types::{ChatSummary, MessageSummary};
use chatpulse_gateway::{AppState, GatewayOptions, GatewaySlot};
use chatpulse_providers::{ChatCompletion, CompletionRequest, CompletionResponse, Usage};

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct StaticClient(Vec<ChatSummary>);

#[async_trait]
impl AutomationClient for StaticClient {
    async fn get_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        Ok(self.0.clone())
    }

    async fn get_recent_messages(
        &self,
        _chat_id: &str,
        _limit: usize,
    ) -> anyhow::Result<Vec<MessageSummary>> {
        Ok(vec![])
    }
}

struct ScriptedLauncher {
    chats: Vec<ChatSummary>,
    script: Vec<ClientEvent>,
    senders: parking_lot::Mutex<Vec<EventSender>>,
    launches: AtomicUsize,
}

#[async_trait]
impl ClientLauncher for ScriptedLauncher {
    async fn launch(&self) -> anyhow::Result<ClientSession> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (session, tx) = ClientSession::new(Arc::new(StaticClient(self.chats.clone())));
        for event in &self.script {
            tx.send(event.clone())?;
        }
        self.senders.lock().push(tx);
        Ok(session)
    }
}

fn chat(id: &str, name: &str, unread: u32, timestamp: i64) -> ChatSummary {
    ChatSummary {
        id: id.into(),
        name: name.into(),
        is_group: id.ends_with("@g.us"),
        unread_count: unread,
        timestamp,
    }
}

/// Answers with the last user message reversed.
struct ReverseModel;

#[async_trait]
impl ChatCompletion for ReverseModel {
    fn id(&self) -> &str {
        "reverse"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(CompletionResponse {
            content: last.chars().rev().collect(),
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            },
        })
    }
}

struct Unavailable;

#[async_trait]
impl ChatCompletion for Unavailable {
    fn id(&self) -> &str {
        "unavailable"
    }

    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        anyhow::bail!("API error (503): upstream overloaded")
    }
}

struct TestServer {
    base: String,
    launcher: Arc<ScriptedLauncher>,
    _dir: tempfile::TempDir,
}

/// Start a server whose client replays `script`, and wait until it answers.
async fn start_test_server(chats: Vec<ChatSummary>, script: Vec<ClientEvent>) -> TestServer {
    start_test_server_with(chats, script, None).await
}

async fn start_test_server_with(
    chats: Vec<ChatSummary>,
    script: Vec<ClientEvent>,
    provider: Option<Arc<dyn ChatCompletion>>,
) -> TestServer {
    let port = find_free_port();
    let dir = tempfile::tempdir().unwrap();

    let launcher = Arc::new(ScriptedLauncher {
        chats,
        script,
        senders: parking_lot::Mutex::new(vec![]),
        launches: AtomicUsize::new(0),
    });
    let slot = Arc::new(GatewaySlot::with_launcher(
        launcher.clone(),
        GatewayOptions::default(),
    ));
    let state = AppState::new(Arc::new(Config::default()), slot)
        .with_provider(provider)
        .with_assistant_store(AssistantStore::new(dir.path().join("assistant.json")));

    tokio::spawn(async move {
        chatpulse_gateway::start_server(Arc::new(state), port)
            .await
            .ok();
    });

    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        if client.get(format!("{base}/health")).send().await.is_ok() {
            break;
        }
    }

    TestServer {
        base,
        launcher,
        _dir: dir,
    }
}

async fn get_json(url: String) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

#[tokio::test]
async fn test_health_before_first_use() {
    let server = start_test_server(vec![], vec![ClientEvent::Ready]).await;

    let body = get_json(format!("{}/health", server.base)).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["client"], "not_started");
    assert!(body["version"].is_string());
    assert_eq!(server.launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unread_when_ready() {
    let server = start_test_server(
        vec![
            chat("1@c.us", "A", 0, 1),
            chat("2@c.us", "B", 3, 2),
            chat("3@c.us", "C", 0, 3),
        ],
        vec![ClientEvent::Ready],
    )
    .await;

    let body = get_json(format!("{}/api/whatsapp/unread", server.base)).await;
    assert_eq!(
        body,
        json!({"status": "ready", "data": {"unreadCount": 1, "totalChats": 3}})
    );

    let health = get_json(format!("{}/health", server.base)).await;
    assert_eq!(health["client"], "ready");
}

#[tokio::test]
async fn test_chats_waiting_for_qr() {
    let server = start_test_server(
        vec![chat("1@c.us", "A", 1, 1)],
        vec![ClientEvent::Qr("2@scan-me".into())],
    )
    .await;

    let body = get_json(format!("{}/api/whatsapp/chats", server.base)).await;
    assert_eq!(body, json!({"status": "waiting_for_qr", "qr": "2@scan-me"}));
}

#[tokio::test]
async fn test_chats_and_latest_shapes() {
    let server = start_test_server(
        vec![
            chat("15550001@c.us", "", 0, 100),
            chat("family@g.us", "Family", 2, 300),
            chat("15550002@c.us", "Bob", 1, 200),
        ],
        vec![ClientEvent::Authenticated, ClientEvent::Ready],
    )
    .await;

    let body = get_json(format!("{}/api/whatsapp/chats", server.base)).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["data"][0]["id"], "15550001");
    assert_eq!(body["data"][0]["name"], "Unknown Contact");
    assert_eq!(body["data"][1]["isGroup"], true);

    let latest = get_json(format!("{}/api/whatsapp/chats/latest?limit=2", server.base)).await;
    let ids: Vec<&str> = latest["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["family", "15550002"]);
}

#[tokio::test]
async fn test_reset_starts_new_session() {
    let server = start_test_server(vec![], vec![ClientEvent::Ready]).await;

    let body = get_json(format!("{}/api/whatsapp/unread", server.base)).await;
    assert_eq!(body["status"], "ready");

    let client = reqwest::Client::new();
    let reset: Value = client
        .post(format!("{}/api/whatsapp/reset", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset, json!({"status": "reset"}));

    let health = get_json(format!("{}/health", server.base)).await;
    assert_eq!(health["client"], "not_started");

    let body = get_json(format!("{}/api/whatsapp/unread", server.base)).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(server.launcher.launches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_brief_without_provider_is_error() {
    let server = start_test_server(vec![], vec![ClientEvent::Ready]).await;

    let body = get_json(format!("{}/api/whatsapp/brief", server.base)).await;
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_assistant_config_roundtrip() {
    let server = start_test_server(vec![], vec![]).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/assistant/config", server.base);

    let empty = get_json(url.clone()).await;
    assert_eq!(empty, json!({"instructions": ""}));

    let rejected = client.post(&url).json(&json!({})).send().await.unwrap();
    assert_eq!(rejected.status(), 400);
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(
        body,
        json!({"status": "error", "message": "No instructions provided in the request body."})
    );

    let saved = client
        .post(&url)
        .json(&json!({"instructions": "Keep replies short."}))
        .send()
        .await
        .unwrap();
    assert_eq!(saved.status(), 200);
    let body: Value = saved.json().await.unwrap();
    assert_eq!(body["status"], "success");

    let stored = get_json(url).await;
    assert_eq!(stored, json!({"instructions": "Keep replies short."}));
}

#[tokio::test]
async fn test_assistant_config_falsy_and_malformed_bodies() {
    let server = start_test_server(vec![], vec![]).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/assistant/config", server.base);

    for body in [
        json!({"instructions": null}),
        json!({"instructions": false}),
        json!({"instructions": ""}),
    ] {
        let response = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(response.status(), 400, "body {body}");
    }

    let malformed = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 500);
    let body: Value = malformed.json().await.unwrap();
    assert!(body["error"].is_string());

    // Whitespace is still text and is stored as given.
    let saved = client
        .post(&url)
        .json(&json!({"instructions": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(saved.status(), 200);
    assert_eq!(get_json(url).await, json!({"instructions": "  "}));
}

#[tokio::test]
async fn test_chat_completions_proxy() {
    let server =
        start_test_server_with(vec![], vec![], Some(Arc::new(ReverseModel))).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/chat/completions", server.base))
        .json(&json!({
            "model": "llama-3.1-8b-instant",
            "messages": [
                {"role": "system", "content": "You are Luna."},
                {"role": "user", "content": "olleh"}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["model"], "llama-3.1-8b-instant");
    assert_eq!(body["choices"][0]["message"]["content"], "hello");
    assert_eq!(
        body["tokenUsage"],
        json!({"promptTokens": 3, "completionTokens": 2, "totalTokens": 5})
    );
    // The proxy never touches the automation client.
    assert_eq!(server.launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chat_completions_errors() {
    let unconfigured = start_test_server(vec![], vec![]).await;
    let client = reqwest::Client::new();
    let request = json!({"messages": [{"role": "user", "content": "hi"}]});

    let response = client
        .post(format!("{}/api/chat/completions", unconfigured.base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not configured"));

    let failing = start_test_server_with(vec![], vec![], Some(Arc::new(Unavailable))).await;
    let response = client
        .post(format!("{}/api/chat/completions", failing.base))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "API error (503): upstream overloaded"}));
}
