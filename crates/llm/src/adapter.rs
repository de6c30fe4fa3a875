//! Provider Adapter
//!
//! One contract over both backends: pick the served provider (with silent
//! fallback), run plain or structured calls, and drive the search-grounded
//! card generation (OpenAI function-tool loop, or Anthropic query planning
//! followed by a single structured call).
//!
//! Prompt wording is supplied by the caller; this module only adds the
//! structural pieces (tool definitions, query padding, allowed-source blocks).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;

use lease_insight_core::streaming::AnalysisEvent;

use crate::provider::LlmProvider;
use crate::search::{format_allowed_sources, format_results_for_llm, SearchResult, WebSearch};
use crate::types::{
    LlmError, LlmRequestOptions, LlmResult, Message, ParameterSchema, ProviderType,
    ToolDefinition,
};

/// Upper bound on model/tool round trips in the search loop.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Results requested per search query.
pub const SEARCH_RESULTS_PER_QUERY: usize = 8;

/// Name of the function tool offered to the primary provider.
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// Query used when a tool call carries no usable query.
pub const DEFAULT_SEARCH_QUERY: &str = "retail lease market data";

/// Search-capable model tried first for primary-provider JSON requests.
pub const ENHANCED_JSON_MODEL: &str = "gpt-4o-mini-search-preview";

/// Outcome of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated<T> {
    /// A provider produced `output`
    Served { provider: ProviderType, output: T },
    /// Neither provider has credentials
    Unconfigured,
}

impl<T> Generated<T> {
    pub fn served(self) -> Option<(ProviderType, T)> {
        match self {
            Generated::Served { provider, output } => Some((provider, output)),
            Generated::Unconfigured => None,
        }
    }

    pub fn is_unconfigured(&self) -> bool {
        matches!(self, Generated::Unconfigured)
    }
}

/// Final text of a search-grounded call plus every URL surfaced by search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutput {
    pub text: String,
    /// First-seen order, no duplicates
    pub evidence_urls: Vec<String>,
}

/// Inputs for a search-grounded card generation.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Card-writing system prompt
    pub system: String,
    /// Appended to `system` when the function-tool loop is used
    pub tool_instructions: String,
    /// System prompt for the query planning step
    pub query_system: String,
    /// Batch instruction, without any source listing
    pub user: String,
    pub topics: Vec<String>,
    pub property_name: String,
    pub address: String,
}

/// Inputs for a structured JSON request.
#[derive(Debug, Clone, Default)]
pub struct JsonRequest {
    pub system: String,
    /// System prompt for the enhanced primary-provider attempt; `None` skips it
    pub enhanced_system: Option<String>,
    pub user: String,
    /// Object schema for providers that enforce one
    pub schema: serde_json::Value,
}

/// Polymorphic front over the configured providers and the search backend.
pub struct ProviderAdapter {
    openai: Option<Arc<dyn LlmProvider>>,
    anthropic: Option<Arc<dyn LlmProvider>>,
    search: Arc<dyn WebSearch>,
}

impl ProviderAdapter {
    pub fn new(
        openai: Option<Arc<dyn LlmProvider>>,
        anthropic: Option<Arc<dyn LlmProvider>>,
        search: Arc<dyn WebSearch>,
    ) -> Self {
        tracing::info!(
            "[adapter] providers: openai={} anthropic={} search={}",
            openai.is_some(),
            anthropic.is_some(),
            search.is_configured()
        );
        Self {
            openai,
            anthropic,
            search,
        }
    }

    fn provider(&self, provider: ProviderType) -> Option<&Arc<dyn LlmProvider>> {
        match provider {
            ProviderType::OpenAI => self.openai.as_ref(),
            ProviderType::Anthropic => self.anthropic.as_ref(),
        }
    }

    /// Whether any provider can serve requests.
    pub fn is_configured(&self) -> bool {
        self.openai.is_some() || self.anthropic.is_some()
    }

    pub fn search_configured(&self) -> bool {
        self.search.is_configured()
    }

    /// Preferred provider if configured, else the alternate, else `None`.
    pub fn resolve(&self, preference: ProviderType) -> Option<(ProviderType, Arc<dyn LlmProvider>)> {
        if let Some(p) = self.provider(preference) {
            return Some((preference, Arc::clone(p)));
        }
        let alternate = preference.alternate();
        self.provider(alternate).map(|p| {
            tracing::info!(
                "[adapter] {} not configured, falling back to {} (model={})",
                preference,
                p.name(),
                p.model()
            );
            (alternate, Arc::clone(p))
        })
    }

    /// Single-shot call without tools.
    ///
    /// With a schema, the primary provider asks for a JSON object and the
    /// secondary provider enforces the schema through a forced tool.
    pub async fn generate(
        &self,
        preference: ProviderType,
        system: &str,
        user: &str,
        schema: Option<serde_json::Value>,
    ) -> LlmResult<Generated<String>> {
        let Some((served, provider)) = self.resolve(preference) else {
            tracing::warn!("[adapter] generate: no provider configured");
            return Ok(Generated::Unconfigured);
        };

        let options = match schema {
            Some(schema) => LlmRequestOptions::json_schema(schema),
            None => LlmRequestOptions::default(),
        };
        let response = provider
            .send_message(vec![Message::user(user)], Some(system.to_string()), vec![], options)
            .await?;

        Ok(Generated::Served {
            provider: served,
            output: response.text().trim().to_string(),
        })
    }

    /// Structured call parsed as a JSON object.
    ///
    /// The primary provider tries the enhanced model first (when an enhanced
    /// system prompt is given) and falls back to its configured model; any
    /// call or parse failure moves on to the next attempt. The secondary
    /// provider makes a single schema-forced call.
    pub async fn generate_json(
        &self,
        preference: ProviderType,
        request: &JsonRequest,
    ) -> LlmResult<Generated<serde_json::Value>> {
        let Some((served, provider)) = self.resolve(preference) else {
            tracing::warn!("[adapter] generate_json: no provider configured");
            return Ok(Generated::Unconfigured);
        };

        let mut attempts: Vec<(LlmRequestOptions, &str)> = Vec::new();
        match served {
            ProviderType::OpenAI => {
                if let Some(enhanced) = request.enhanced_system.as_deref() {
                    let mut options = LlmRequestOptions::json_object();
                    options.model_override = Some(ENHANCED_JSON_MODEL.to_string());
                    attempts.push((options, enhanced));
                }
                attempts.push((LlmRequestOptions::json_object(), request.system.as_str()));
            }
            ProviderType::Anthropic => {
                attempts.push((
                    LlmRequestOptions::json_schema(request.schema.clone()),
                    request.system.as_str(),
                ));
            }
        }

        let mut last_error = LlmError::Other {
            message: "no attempts made".to_string(),
        };
        for (options, system) in attempts {
            let model = options
                .model_override
                .clone()
                .unwrap_or_else(|| provider.model().to_string());
            let result = provider
                .send_message(
                    vec![Message::user(request.user.as_str())],
                    Some(system.to_string()),
                    vec![],
                    options,
                )
                .await;
            match result.and_then(|r| parse_json_object(r.text())) {
                Ok(value) => {
                    tracing::info!("[adapter] generate_json served by {} (model={})", served, model);
                    return Ok(Generated::Served {
                        provider: served,
                        output: value,
                    });
                }
                Err(e) => {
                    tracing::warn!("[adapter] generate_json attempt with {} failed: {}", model, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Search-grounded generation.
    ///
    /// Returns the model's final text and the URLs surfaced by every search
    /// run along the way. Without a search backend the call degrades to a
    /// plain structured call with no evidence URLs.
    pub async fn generate_with_search(
        &self,
        preference: ProviderType,
        request: &SearchRequest,
        progress: Option<&mpsc::Sender<AnalysisEvent>>,
    ) -> LlmResult<Generated<SearchOutput>> {
        let Some((served, provider)) = self.resolve(preference) else {
            tracing::warn!("[adapter] generate_with_search: no provider configured");
            return Ok(Generated::Unconfigured);
        };

        let output = match served {
            ProviderType::OpenAI => self.openai_tool_loop(provider.as_ref(), request, progress).await?,
            ProviderType::Anthropic => {
                self.planned_search(provider.as_ref(), request, progress).await?
            }
        };

        tracing::info!(
            "[adapter] search-grounded call served by {}: {} chars, {} evidence urls",
            provider.name(),
            output.text.len(),
            output.evidence_urls.len()
        );
        Ok(Generated::Served {
            provider: served,
            output,
        })
    }

    /// Function-tool loop: the model asks for searches until it answers or
    /// the round limit is hit.
    async fn openai_tool_loop(
        &self,
        provider: &dyn LlmProvider,
        request: &SearchRequest,
        progress: Option<&mpsc::Sender<AnalysisEvent>>,
    ) -> LlmResult<SearchOutput> {
        if !self.search.is_configured() || !provider.supports_tools() {
            emit(progress, "Processing with OpenAI...").await;
            let response = provider
                .send_message(
                    vec![Message::user(request.user.as_str())],
                    Some(request.system.clone()),
                    vec![],
                    LlmRequestOptions::json_object(),
                )
                .await?;
            return Ok(SearchOutput {
                text: strip_code_fence(response.text()),
                evidence_urls: Vec::new(),
            });
        }

        emit(progress, "Searching the web for sources...").await;

        let system = format!("{}{}", request.system, request.tool_instructions);
        let tools = vec![web_search_tool()];
        let mut messages = vec![Message::user(request.user.as_str())];
        let mut evidence = EvidenceUrls::default();
        let mut content = String::from("{}");

        for round in 0..MAX_TOOL_ROUNDS {
            let response = provider
                .send_message(
                    messages.clone(),
                    Some(system.clone()),
                    tools.clone(),
                    LlmRequestOptions::default(),
                )
                .await?;

            content = non_empty_or_braces(response.text());
            if !response.has_tool_calls() {
                break;
            }
            tracing::debug!(
                "[adapter] tool round {}: {} call(s)",
                round + 1,
                response.tool_calls.len()
            );

            messages.push(Message::assistant_tool_calls(
                response.content.clone(),
                &response.tool_calls,
            ));
            for call in &response.tool_calls {
                let result = if call.name == WEB_SEARCH_TOOL {
                    let query = search_query(&call.arguments);
                    let results = self.search.search(&query, SEARCH_RESULTS_PER_QUERY).await;
                    evidence.extend(&results);
                    format_results_for_llm(&query, &results)
                } else {
                    format!("Unknown tool: {}", call.name)
                };
                messages.push(Message::tool_result(call.id.as_str(), result));
            }
        }

        emit(progress, "Processing with OpenAI...").await;
        Ok(SearchOutput {
            text: strip_code_fence(&content),
            evidence_urls: evidence.into_vec(),
        })
    }

    /// Query planning, one search per query, then a single schema call with
    /// an allowed-sources block.
    async fn planned_search(
        &self,
        provider: &dyn LlmProvider,
        request: &SearchRequest,
        progress: Option<&mpsc::Sender<AnalysisEvent>>,
    ) -> LlmResult<SearchOutput> {
        let mut results: Vec<SearchResult> = Vec::new();

        if self.search.is_configured() {
            emit(progress, "Preparing search queries...").await;
            match self.plan_queries(provider, request).await {
                Ok(queries) => {
                    emit(progress, "Searching the web for sources...").await;
                    let mut seen = HashSet::new();
                    for query in queries {
                        for hit in self.search.search(&query, SEARCH_RESULTS_PER_QUERY).await {
                            if seen.insert(hit.url.clone()) {
                                results.push(hit);
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!("[adapter] search query planning failed: {}", e),
            }
        }

        let mut user = request.user.clone();
        if !results.is_empty() {
            user.push('\n');
            user.push_str(&format_allowed_sources(&results));
        }

        emit(progress, "Processing with Claude...").await;
        let response = provider
            .send_message(
                vec![Message::user(user)],
                Some(request.system.clone()),
                vec![],
                LlmRequestOptions::json_schema(cards_schema()),
            )
            .await?;

        let mut evidence = EvidenceUrls::default();
        evidence.extend(&results);
        Ok(SearchOutput {
            text: strip_code_fence(response.text()),
            evidence_urls: evidence.into_vec(),
        })
    }

    /// One search query per topic, padded and cleaned.
    async fn plan_queries(
        &self,
        provider: &dyn LlmProvider,
        request: &SearchRequest,
    ) -> LlmResult<Vec<String>> {
        let topics = request
            .topics
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}", i + 1, t))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Property: {}\nAddress: {}\n\nTopics (one search query per topic, same order):\n{}\n\n\
             Output JSON only: {{\"queries\": [\"query1\", \"query2\", ...]}}",
            request.property_name, request.address, topics
        );

        let response = provider
            .send_message(
                vec![Message::user(prompt)],
                Some(request.query_system.clone()),
                vec![],
                LlmRequestOptions::json_schema(queries_schema()),
            )
            .await?;
        let value = parse_json_object(response.text())?;
        let planned: Vec<String> = value
            .get("queries")
            .and_then(|q| q.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|q| q.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(pad_queries(planned, request))
    }
}

/// Pad to one query per topic, drop extras, replace blanks.
fn pad_queries(mut queries: Vec<String>, request: &SearchRequest) -> Vec<String> {
    let wanted = request.topics.len();
    while queries.len() < wanted {
        queries.push(format!(
            "{} {} retail lease market data",
            request.address, request.property_name
        ));
    }
    queries.truncate(wanted);
    queries
        .into_iter()
        .map(|q| {
            let q = q.trim();
            if q.is_empty() {
                format!("{} retail lease", request.address)
            } else {
                q.to_string()
            }
        })
        .collect()
}

/// Ordered, de-duplicated URL collection.
#[derive(Debug, Default)]
struct EvidenceUrls {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl EvidenceUrls {
    fn extend(&mut self, results: &[SearchResult]) {
        for r in results {
            let url = r.url.trim();
            if !url.is_empty() && self.seen.insert(url.to_string()) {
                self.ordered.push(url.to_string());
            }
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

async fn emit(progress: Option<&mpsc::Sender<AnalysisEvent>>, message: &str) {
    if let Some(tx) = progress {
        // A closed receiver only means nobody is listening any more.
        let _ = tx.send(AnalysisEvent::progress(message)).await;
    }
}

fn non_empty_or_braces(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "{}".to_string()
    } else {
        trimmed.to_string()
    }
}

fn search_query(arguments: &serde_json::Value) -> String {
    arguments
        .get("query")
        .and_then(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_SEARCH_QUERY)
        .to_string()
}

/// The `web_search(query)` function tool.
pub fn web_search_tool() -> ToolDefinition {
    let mut properties = HashMap::new();
    properties.insert(
        "query".to_string(),
        ParameterSchema::string(Some(
            "Specific search query (e.g. address + topic + 'retail rent market')",
        )),
    );
    ToolDefinition::new(
        WEB_SEARCH_TOOL,
        "Search the web for current market data, rental comps, demographics, or public records. \
         Call once per topic with a specific query. Returns a list of sources with title, URL, \
         and content. You MUST use only these URLs as source_url in your cards.",
        ParameterSchema::object(None, properties, vec!["query".to_string()]),
    )
}

fn queries_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "queries": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["queries"]
    })
}

/// Schema for a `{"cards": [...]}` payload.
pub fn cards_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "cards": {"type": "array", "items": {"type": "object"}}
        },
        "required": ["cards"]
    })
}

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```).
pub fn strip_code_fence(text: &str) -> String {
    let mut content = text.trim();
    if let Some(rest) = content.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline.
        content = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches("json"),
        };
        if let Some(end) = content.rfind("```") {
            content = &content[..end];
        }
    }
    content.trim().to_string()
}

/// Parse text (optionally fenced) as a JSON object.
pub fn parse_json_object(text: &str) -> LlmResult<serde_json::Value> {
    let stripped = strip_code_fence(text);
    let value: serde_json::Value =
        serde_json::from_str(&stripped).map_err(|e| LlmError::ParseError {
            message: format!("invalid JSON: {}", e),
        })?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(LlmError::ParseError {
            message: "expected a JSON object".to_string(),
        })
    }
}
