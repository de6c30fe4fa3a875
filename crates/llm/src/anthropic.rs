//! Anthropic Claude Provider
//!
//! Implementation of the LlmProvider trait for Anthropic's Messages API.
//!
//! Structured output is requested by forcing a single tool whose
//! `input_schema` is the wanted schema; the tool input is returned as the
//! response text so callers always receive a JSON string.

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageContent, MessageRole,
    ProviderConfig, ResponseFormat, StopReason, ToolCall, ToolDefinition,
    UsageStats,
};
use crate::http_client::build_http_client;

/// Default Anthropic API endpoint
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Current API version
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Name of the forced tool carrying structured output.
pub const STRUCTURED_OUTPUT_TOOL: &str = "structured_output";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = build_http_client();
        Self { config, client }
    }

    /// Get the API base URL
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL)
    }

    /// The schema to force, if structured output was requested.
    fn structured_schema(request_options: &LlmRequestOptions) -> Option<serde_json::Value> {
        match &request_options.response_format {
            Some(ResponseFormat::JsonSchema { schema }) => Some(schema.clone()),
            Some(ResponseFormat::JsonObject) => Some(serde_json::json!({ "type": "object" })),
            None => None,
        }
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let model = request_options
            .model_override
            .as_deref()
            .unwrap_or(&self.config.model);

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        let claude_messages: Vec<serde_json::Value> =
            messages.iter().map(|m| self.message_to_claude(m)).collect();
        body["messages"] = serde_json::json!(claude_messages);

        if let Some(schema) = Self::structured_schema(request_options) {
            body["tools"] = serde_json::json!([{
                "name": STRUCTURED_OUTPUT_TOOL,
                "description": "Return the final answer as structured JSON.",
                "input_schema": schema
            }]);
            body["tool_choice"] = serde_json::json!({
                "type": "tool",
                "name": STRUCTURED_OUTPUT_TOOL
            });
        } else if !tools.is_empty() {
            let claude_tools: Vec<serde_json::Value> =
                tools.iter().map(|t| self.tool_to_claude(t)).collect();
            body["tools"] = serde_json::json!(claude_tools);
        }

        body
    }

    /// Convert a Message to Claude API format
    fn message_to_claude(&self, message: &Message) -> serde_json::Value {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let content: Vec<serde_json::Value> = message
            .content
            .iter()
            .map(|c| match c {
                MessageContent::Text { text } => serde_json::json!({
                    "type": "text",
                    "text": text
                }),
                MessageContent::ToolUse { id, name, input } => serde_json::json!({
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input
                }),
                MessageContent::ToolResult {
                    tool_use_id,
                    content,
                } => serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content
                }),
            })
            .collect();

        serde_json::json!({
            "role": role,
            "content": content
        })
    }

    /// Convert a ToolDefinition to Claude API format
    fn tool_to_claude(&self, tool: &ToolDefinition) -> serde_json::Value {
        serde_json::json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema
        })
    }

    /// Parse a response from Claude API
    fn parse_response(&self, response: &ClaudeResponse, structured: bool) -> LlmResponse {
        let mut texts: Vec<&str> = Vec::new();
        let mut tool_calls = Vec::new();
        let mut structured_output = None;

        for block in &response.content {
            match block {
                ContentBlock::Text { text } => texts.push(text),
                ContentBlock::ToolUse { id, name, input } => {
                    if structured && name == STRUCTURED_OUTPUT_TOOL {
                        structured_output = Some(input.to_string());
                    } else {
                        tool_calls.push(ToolCall {
                            id: id.clone(),
                            name: name.clone(),
                            arguments: input.clone(),
                        });
                    }
                }
                ContentBlock::Other => {}
            }
        }

        let content = structured_output.or_else(|| {
            let joined = texts.join("\n");
            (!joined.is_empty()).then_some(joined)
        });

        let stop_reason = match response.stop_reason.as_deref() {
            // A forced tool ends with tool_use; the answer is already in hand.
            Some("tool_use") if structured => StopReason::EndTurn,
            Some(reason) => StopReason::from(reason),
            None => StopReason::EndTurn,
        };

        LlmResponse {
            content,
            tool_calls,
            stop_reason,
            usage: UsageStats {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
            model: response.model.clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
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
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("anthropic"))?;

        let structured = request_options.response_format.is_some();
        let body = self.build_request_body(&messages, system.as_deref(), &tools, &request_options);
        tracing::debug!(
            "[anthropic] request model={} messages={} structured={}",
            body["model"],
            messages.len(),
            structured
        );

        let response = self
            .client
            .post(self.base_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &body_text, "anthropic"));
        }

        let claude_response: ClaudeResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.parse_response(&claude_response, structured))
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Claude API response format
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
