//! Shared state for the HTTP server.

use std::sync::Arc;

use tracing::{info, warn};

use chatpulse_core::assistant::AssistantStore;
use chatpulse_core::config::Config;
use chatpulse_providers::{BriefGenerator, ChatCompletion, OpenAiProvider};

use crate::slot::GatewaySlot;

/// Shared state accessible from all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<GatewaySlot>,
    pub assistant: AssistantStore,
    pub brief: Option<BriefGenerator>,
    /// Provider behind `/api/chat/completions`; shared with the brief.
    pub completions: Option<Arc<dyn ChatCompletion>>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl AppState {
    /// Build the state from config. The brief and completion routes are only
    /// available when an API key resolves.
    pub fn new(config: Arc<Config>, gateway: Arc<GatewaySlot>) -> Self {
        let brief_config = config.brief();
        let provider = OpenAiProvider::from_brief_config(&brief_config)
            .map(|provider| Arc::new(provider) as Arc<dyn ChatCompletion>);
        match &provider {
            Some(_) => info!(model = %brief_config.model, "LLM provider enabled"),
            None => warn!("No brief API key configured; brief and chat completions are disabled"),
        }

        Self {
            assistant: AssistantStore::new(config.instructions_path()),
            config,
            gateway,
            brief: None,
            completions: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
        .with_provider(provider)
    }

    /// Replace the LLM provider used by the brief and chat completions.
    pub fn with_provider(mut self, provider: Option<Arc<dyn ChatCompletion>>) -> Self {
        let brief_config = self.config.brief();
        self.brief = provider
            .clone()
            .map(|provider| BriefGenerator::new(provider, &brief_config));
        self.completions = provider;
        self
    }

    pub fn with_assistant_store(mut self, store: AssistantStore) -> Self {
        self.assistant = store;
        self
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
