//! Application State
//!
//! Shared services for the HTTP server and the CLI, built once from the
//! configuration.

use std::sync::Arc;

use lease_insight_llm::{
    build_http_client, AnthropicProvider, LlmProvider, OpenAIProvider, ProviderAdapter,
    TavilyClient, WebSearch,
};

use crate::config::AppConfig;
use crate::services::{
    AccessRequestNotifier, EntitlementService, NoEntitlements, SessionEngine, SupabaseEntitlements,
};
use crate::storage::{SessionStore, SqliteSessionStore};
use crate::utils::error::AppResult;

/// Cloneable handle on every service
#[derive(Clone)]
pub struct AppState {
    pub engine: SessionEngine,
    pub notifier: Arc<AccessRequestNotifier>,
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    /// Open the session store at the configured path and wire the services.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let store = SqliteSessionStore::open(&config.session_db_path, config.session_ttl)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Wire the services around an existing store.
    pub fn with_store(config: &AppConfig, store: Arc<dyn SessionStore>) -> Self {
        let openai = config
            .openai_provider()
            .map(|c| Arc::new(OpenAIProvider::new(c)) as Arc<dyn LlmProvider>);
        let anthropic = config
            .anthropic_provider()
            .map(|c| Arc::new(AnthropicProvider::new(c)) as Arc<dyn LlmProvider>);
        let search: Arc<dyn WebSearch> = Arc::new(TavilyClient::new(config.tavily_api_key.clone()));
        let adapter = Arc::new(ProviderAdapter::new(openai, anthropic, search));

        let client = build_http_client();
        let entitlements: Arc<dyn EntitlementService> = match &config.supabase {
            Some(supabase) => Arc::new(SupabaseEntitlements::new(client.clone(), supabase.clone())),
            None => Arc::new(NoEntitlements),
        };

        Self {
            engine: SessionEngine::new(store, adapter, entitlements),
            notifier: Arc::new(AccessRequestNotifier::new(client, config.access_webhook.clone())),
            cors_origins: Arc::new(config.cors_origins.clone()),
        }
    }
}
