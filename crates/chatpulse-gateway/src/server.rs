//! Axum-based HTTP server.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use chatpulse_core::assistant::AssistantInstructions;

use crate::actions;
use crate::state::AppState;

/// Build the router with every route.
pub fn router(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/whatsapp/unread", get(unread_handler))
        .route("/api/whatsapp/chats", get(chats_handler))
        .route("/api/whatsapp/chats/latest", get(latest_chats_handler))
        .route("/api/whatsapp/brief", get(brief_handler))
        .route("/api/whatsapp/reset", post(reset_handler))
        .route("/api/chat/completions", post(completions_handler))
        .route(
            "/api/assistant/config",
            get(get_instructions_handler).post(save_instructions_handler),
        );

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{addr}");

    let slot = state.gateway.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    slot.reset();
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let client = state
        .gateway
        .current()
        .map(|g| g.status())
        .unwrap_or("not_started");

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "client": client,
    }))
}

async fn unread_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(actions::unread(&state.gateway.get()).await)
}

async fn chats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(actions::chats(&state.gateway.get()).await)
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    limit: Option<usize>,
}

async fn latest_chats_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(actions::DEFAULT_LATEST_LIMIT);
    Json(actions::latest(&state.gateway.get(), limit).await)
}

async fn brief_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(actions::brief(&state.gateway.get(), state.brief.as_ref()).await)
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.gateway.reset();
    #[cfg(feature = "metrics")]
    crate::metrics::record_reset();
    Json(json!({ "status": "reset" }))
}

async fn completions_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<actions::CompletionParams>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body {
        Ok(Json(params)) => {
            actions::complete(state.completions.as_deref(), &state.config.brief(), params).await
        }
        Err(rejection) => Err(anyhow::anyhow!(rejection.body_text())),
    };
    match result {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            error!(%e, "Chat completion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

/// The `instructions` field when it is present and truthy. Only strings are
/// stored; other truthy values are rejected like a missing field.
fn instructions_field(body: &serde_json::Value) -> Option<String> {
    match body.get("instructions")? {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

async fn get_instructions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.assistant.load().await {
        Ok(instructions) => (
            StatusCode::OK,
            Json(json!(instructions.unwrap_or_default())),
        ),
        Err(e) => {
            error!(%e, path = %state.assistant.path().display(), "Failed to read instructions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": format!("Failed to read instructions: {e}"),
                })),
            )
        }
    }
}

async fn save_instructions_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> impl IntoResponse {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            error!(error = %rejection.body_text(), "Malformed instructions request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": rejection.body_text() })),
            );
        }
    };

    let Some(instructions) = instructions_field(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "No instructions provided in the request body.",
            })),
        );
    };

    match state
        .assistant
        .save(&AssistantInstructions { instructions })
        .await
    {
        Ok(()) => {
            info!(path = %state.assistant.path().display(), "Assistant instructions saved");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "Instructions updated and saved to file successfully",
                })),
            )
        }
        Err(e) => {
            error!(%e, "Failed to write instructions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": format!("Failed to write instructions to file: {e}"),
                })),
            )
        }
    }
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
