//! Web Search
//!
//! Tavily search client plus the formatters that turn results into text a
//! model can read. Search is optional: an unconfigured client and every
//! failure yield an empty result list, never an error.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http_client::build_http_client;

/// Default Tavily endpoint
const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// Per-result content cap as returned by the client.
const MAX_RESULT_CONTENT: usize = 2000;

/// Per-result content cap in a tool result.
const MAX_TOOL_CONTENT: usize = 1200;

/// Per-result content cap in an allowed-sources block.
const MAX_SOURCE_CONTENT: usize = 1500;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Whether searches can return anything at all.
    fn is_configured(&self) -> bool;

    /// Run one query. Never fails; problems yield an empty list.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

/// Search backend used when no key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSearch;

#[async_trait]
impl WebSearch for NoSearch {
    fn is_configured(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Vec<SearchResult> {
        Vec::new()
    }
}

/// Tavily REST client.
pub struct TavilyClient {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: TAVILY_API_URL.to_string(),
            client: build_http_client(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(&self, api_key: &str, query: &str, max_results: usize) -> Result<TavilyResponse, String> {
        let body = serde_json::json!({
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_answer": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), truncate_chars(&text, 200)));
        }

        response.json::<TavilyResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Vec::new();
        };

        match self.request(api_key, query, max_results).await {
            Ok(response) => {
                let results = clean_results(response.results);
                tracing::info!(
                    "[tavily] query={} returned {} results",
                    truncate_chars(query, 80),
                    results.len()
                );
                results
            }
            Err(e) => {
                tracing::warn!("[tavily] search failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Trim fields, drop empty and repeated URLs, default the title to the URL.
fn clean_results(hits: Vec<TavilyHit>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for hit in hits {
        let url = hit.url.unwrap_or_default().trim().to_string();
        if url.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        let title = hit
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.clone());
        let content = truncate_chars(hit.content.unwrap_or_default().trim(), MAX_RESULT_CONTENT);
        out.push(SearchResult { title, url, content });
    }
    out
}

/// First `max` characters of `text` (char-boundary safe).
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn listing_entry(index: usize, result: &SearchResult, max_content: usize) -> String {
    let title = if result.title.trim().is_empty() {
        "Untitled"
    } else {
        result.title.trim()
    };
    format!(
        "{}. Title: {}\n   URL: {}\n   Content: {}",
        index,
        title,
        result.url.trim(),
        truncate_chars(result.content.trim(), max_content)
    )
}

/// Tool result text for one `web_search` call.
pub fn format_results_for_llm(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results for: {}", truncate_chars(query, 100));
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| listing_entry(i + 1, r, MAX_TOOL_CONTENT))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Block appended to a user instruction that restricts citations to `results`.
pub fn format_allowed_sources(results: &[SearchResult]) -> String {
    let mut parts = vec![
        String::new(),
        "--- ALLOWED SOURCES (you MUST use only these for citations) ---".to_string(),
        "For each card, pick ONE source from the list below. Set source_url to that entry's exact URL. \
         Set source to a SHORT 3-4 word name that identifies it. \
         Use a DIFFERENT source (different URL) for each card when possible. \
         The insight and data_evidence for that card must be based ONLY on that source's content."
            .to_string(),
        String::new(),
    ];
    for (i, r) in results.iter().enumerate() {
        parts.push(listing_entry(i + 1, r, MAX_SOURCE_CONTENT));
        parts.push(String::new());
    }
    parts.push(
        "CRITICAL: source_url MUST be an exact URL from the list above. source MUST be 3-4 words only. \
         If no source above fits a topic, set source to 'Not available', source_url to null, \
         data_evidence to 'No data', confidence_score to 0."
            .to_string(),
    );
    parts.join("\n")
}
