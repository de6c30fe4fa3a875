//! Shared test doubles: a scripted LLM provider and a fixed search backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use lease_insight::services::research::prompts;
use lease_insight::services::{NoEntitlements, SessionEngine, StartRequest};
use lease_insight::storage::SqliteSessionStore;
use lease_insight::{Role, SessionRecord};
use lease_insight_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent,
    NoSearch, ProviderAdapter, ProviderConfig, ProviderType, SearchResult, StopReason,
    ToolCall, ToolDefinition, UsageStats, WebSearch,
};

/// One request as seen by the scripted provider.
#[derive(Debug, Clone)]
pub struct Call {
    pub system: String,
    pub user: String,
    pub has_tool_results: bool,
    pub options: LlmRequestOptions,
}

impl Call {
    pub fn is_batch(&self) -> bool {
        self.system.starts_with(prompts::RESEARCH_SYSTEM)
    }

    pub fn is_dashboard(&self) -> bool {
        self.system.contains("fair_market_rent")
    }

    pub fn is_custom_card(&self) -> bool {
        self.system.starts_with(prompts::CUSTOM_CARD_SYSTEM)
    }

    pub fn is_edit(&self) -> bool {
        self.system.starts_with(prompts::EDIT_CARD_SYSTEM)
    }

    /// Topics listed in a batch instruction, in order.
    pub fn topics(&self) -> Vec<String> {
        self.user
            .lines()
            .filter_map(|line| {
                let (number, topic) = line.trim().split_once(". ")?;
                number
                    .chars()
                    .all(|c| c.is_ascii_digit())
                    .then(|| topic.to_string())
            })
            .collect()
    }
}

type Script = dyn Fn(&Call) -> LlmResult<LlmResponse> + Send + Sync;

/// Provider whose replies come from a closure.
pub struct ScriptedProvider {
    config: ProviderConfig,
    script: Box<Script>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&Call) -> LlmResult<LlmResponse> + Send + Sync + 'static,
    {
        Self::build(script, None)
    }

    /// Every reply arrives after `delay` (virtual time in paused tests).
    pub fn slow<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&Call) -> LlmResult<LlmResponse> + Send + Sync + 'static,
    {
        Self::build(script, Some(delay))
    }

    fn build<F>(script: F, delay: Option<Duration>) -> Arc<Self>
    where
        F: Fn(&Call) -> LlmResult<LlmResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            config: ProviderConfig {
                provider: ProviderType::OpenAI,
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            script: Box::new(script),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        _tools: Vec<ToolDefinition>,
        options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let user = messages
            .first()
            .and_then(|m| {
                m.content.iter().find_map(|c| match c {
                    MessageContent::Text { text } => Some(text.clone()),
                    _ => None,
                })
            })
            .unwrap_or_default();
        let has_tool_results = messages.iter().any(|m| {
            m.content
                .iter()
                .any(|c| matches!(c, MessageContent::ToolResult { .. }))
        });
        let call = Call {
            system: system.unwrap_or_default(),
            user,
            has_tool_results,
            options,
        };
        self.calls.lock().unwrap().push(call.clone());
        (self.script)(&call)
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Same results for every query.
pub struct FixedSearch {
    pub results: Vec<SearchResult>,
}

impl FixedSearch {
    pub fn with_urls(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            results: urls
                .iter()
                .map(|url| SearchResult {
                    title: format!("Report at {}", url),
                    url: url.to_string(),
                    content: "Retail rents rose 3% year over year.".to_string(),
                })
                .collect(),
        })
    }
}

#[async_trait]
impl WebSearch for FixedSearch {
    fn is_configured(&self) -> bool {
        true
    }

    async fn search(&self, _query: &str, max_results: usize) -> Vec<SearchResult> {
        self.results.iter().take(max_results).cloned().collect()
    }
}

pub fn reply(text: impl Into<String>) -> LlmResult<LlmResponse> {
    Ok(LlmResponse {
        content: Some(text.into()),
        tool_calls: Vec::new(),
        stop_reason: StopReason::EndTurn,
        usage: UsageStats::default(),
        model: "scripted".to_string(),
    })
}

pub fn search_call(query: &str) -> LlmResult<LlmResponse> {
    Ok(LlmResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: "web_search".to_string(),
            arguments: json!({ "query": query }),
        }],
        stop_reason: StopReason::ToolUse,
        usage: UsageStats::default(),
        model: "scripted".to_string(),
    })
}

pub fn failure() -> LlmResult<LlmResponse> {
    Err(LlmError::ServerError {
        message: "upstream exploded".to_string(),
        status: Some(502),
    })
}

/// A well-formed raw card.
pub fn card_json(title: &str) -> Value {
    json!({
        "title": title,
        "impact": "positive",
        "confidence_score": 80,
        "source": "CoStar market report",
        "insight": format!("{} favours the tenant.", title),
        "data_evidence": "Vacancy 7.5% vs 5.8% metro",
        "why_it_matters": "Supports a lower rent ask.",
        "baseline_pct": 40,
        "current_trend_pct": 55,
        "source_url": null
    })
}

pub fn cards_reply(cards: Vec<Value>) -> LlmResult<LlmResponse> {
    reply(json!({ "cards": cards }).to_string())
}

pub fn dashboard_reply() -> LlmResult<LlmResponse> {
    reply(
        json!({
            "fair_market_rent": 46.0,
            "confidence_score": 72,
            "vs_current_pct": 999,
            "recommendations": {
                "ideal_term": "5 Years + 5 Option",
                "ideal_term_reasoning": "Rising vacancy",
                "negotiation_leverage": "High",
                "negotiation_leverage_reasoning": "Vacancy above metro",
                "renewals": "Cap at 2% YoY",
                "renewals_reasoning": "Flat rent forecast"
            },
            "portfolio_context": {
                "this_property_rent": 46.0,
                "portfolio_avg_rent": 50.0,
                "comparison_text": ""
            }
        })
        .to_string(),
    )
}

pub fn adapter(provider: Option<Arc<ScriptedProvider>>, search: Arc<dyn WebSearch>) -> Arc<ProviderAdapter> {
    let openai = provider.map(|p| p as Arc<dyn LlmProvider>);
    Arc::new(ProviderAdapter::new(openai, None, search))
}

pub fn engine(provider: Option<Arc<ScriptedProvider>>) -> SessionEngine {
    engine_with_search(provider, Arc::new(NoSearch))
}

pub fn engine_with_search(
    provider: Option<Arc<ScriptedProvider>>,
    search: Arc<dyn WebSearch>,
) -> SessionEngine {
    let store = SqliteSessionStore::in_memory(Duration::from_secs(3600)).unwrap();
    SessionEngine::new(
        Arc::new(store),
        adapter(provider, search),
        Arc::new(NoEntitlements),
    )
}

pub fn acme_plaza() -> StartRequest {
    StartRequest {
        analyze_as: "tenant".to_string(),
        property_name: "Acme Plaza".to_string(),
        address: "100 Main St, Springfield".to_string(),
        leasable_area: "2,400".to_string(),
        current_base_rent: "50".to_string(),
        ..Default::default()
    }
}

/// Stored form of a landlord session on Acme Plaza.
pub fn plaza_record(provider: ProviderType) -> SessionRecord {
    SessionRecord {
        analyze_as: Role::Landlord,
        property_name: "Acme Plaza".to_string(),
        address: "100 Main St".to_string(),
        leasable_area: "2,400".to_string(),
        current_base_rent: "50".to_string(),
        document_context: None,
        llm_provider: provider,
        username: None,
        cards: Vec::new(),
        custom_cards: Vec::new(),
        dashboard_summary: None,
    }
}
