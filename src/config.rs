//! Configuration
//!
//! Settings are read from the process environment (after `.env` has been
//! loaded by the binary) into a single [`AppConfig`].

use std::path::PathBuf;
use std::time::Duration;

use lease_insight_llm::{ProviderConfig, ProviderType};

use crate::utils::error::AppResult;
use crate::utils::paths::default_session_db_path;

/// Default session lifetime (6 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 6 * 60 * 60;

/// Shortest accepted session lifetime.
pub const MIN_SESSION_TTL_SECS: u64 = 60;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_ALLOWED_USERS_TABLE: &str = "allowed_users";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Values copied from `.env.example` that must not count as real keys.
const PLACEHOLDER_KEYS: [&str; 2] = ["sk-...", "sk-ant-..."];

/// Supabase allow-list settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub table: String,
}

/// Access-request webhook settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub tavily_api_key: Option<String>,
    pub supabase: Option<SupabaseConfig>,
    pub session_ttl: Duration,
    pub session_db_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub access_webhook: Option<WebhookConfig>,
}

impl AppConfig {
    /// Read every setting from the process environment.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).and_then(|v| clean_value(&v));

        let supabase = match (value("SUPABASE_URL"), value("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
                table: value("SUPABASE_ALLOWED_USERS_TABLE")
                    .unwrap_or_else(|| DEFAULT_ALLOWED_USERS_TABLE.to_string()),
            }),
            _ => None,
        };

        let access_webhook = value("ACCESS_REQUEST_WEBHOOK_URL").map(|url| WebhookConfig {
            url,
            secret: value("ACCESS_REQUEST_WEBHOOK_SECRET"),
        });

        let session_db_path = match value("SESSION_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_session_db_path()?,
        };

        let cors_origins = value("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);

        Ok(Self {
            openai_api_key: value("OPENAI_API_KEY").filter(|k| !is_placeholder(k)),
            openai_model: value("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            anthropic_api_key: value("ANTHROPIC_API_KEY").filter(|k| !is_placeholder(k)),
            anthropic_model: value("ANTHROPIC_MODEL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            tavily_api_key: value("TAVILY_API_KEY"),
            supabase,
            session_ttl: parse_ttl(value("SESSION_TTL_SECONDS").as_deref()),
            session_db_path,
            cors_origins,
            access_webhook,
        })
    }

    /// Provider settings for OpenAI, if a key is configured.
    pub fn openai_provider(&self) -> Option<ProviderConfig> {
        self.openai_api_key.as_ref().map(|key| ProviderConfig {
            provider: ProviderType::OpenAI,
            api_key: Some(key.clone()),
            model: self.openai_model.clone(),
            ..Default::default()
        })
    }

    /// Provider settings for Anthropic, if a key is configured.
    pub fn anthropic_provider(&self) -> Option<ProviderConfig> {
        self.anthropic_api_key.as_ref().map(|key| ProviderConfig {
            provider: ProviderType::Anthropic,
            api_key: Some(key.clone()),
            model: self.anthropic_model.clone(),
            ..Default::default()
        })
    }

    /// Log which integrations are enabled. Never logs secrets.
    pub fn log_summary(&self) {
        tracing::info!(
            "[config] openai={} anthropic={} tavily={} supabase={} webhook={} ttl={}s db={}",
            self.openai_api_key.is_some(),
            self.anthropic_api_key.is_some(),
            self.tavily_api_key.is_some(),
            self.supabase.is_some(),
            self.access_webhook.is_some(),
            self.session_ttl.as_secs(),
            self.session_db_path.display()
        );
    }
}

/// Trim whitespace and surrounding quotes; empty becomes `None`.
fn clean_value(raw: &str) -> Option<String> {
    let v = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn is_placeholder(key: &str) -> bool {
    PLACEHOLDER_KEYS.contains(&key)
}

fn parse_ttl(raw: Option<&str>) -> Duration {
    let secs = raw
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| v.max(MIN_SESSION_TTL_SECS))
        .unwrap_or(DEFAULT_SESSION_TTL_SECS);
    Duration::from_secs(secs)
}
