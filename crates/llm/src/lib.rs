//! Lease Insight LLM
//!
//! Provides a unified interface over the two LLM backends:
//! - OpenAI (chat completions, function tools)
//! - Anthropic Claude (messages API, forced-tool structured output)
//!
//! Also includes the Tavily web-search client, the HTTP client factory, and
//! the `ProviderAdapter` that selects a provider and runs the search loop.

pub mod adapter;
pub mod anthropic;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod search;
pub mod types;

// Re-export main types
pub use adapter::{
    cards_schema, parse_json_object, strip_code_fence, Generated, JsonRequest, ProviderAdapter,
    SearchOutput, SearchRequest,
};
pub use anthropic::AnthropicProvider;
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use search::{NoSearch, SearchResult, TavilyClient, WebSearch};
pub use types::*;
