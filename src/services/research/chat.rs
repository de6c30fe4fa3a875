//! Chat over a session's accumulated context.

use lease_insight_llm::{Generated, ProviderAdapter};

use super::prompts;
use crate::models::session::SessionRecord;

pub const SESSION_EXPIRED_REPLY: &str = "Your analysis session has expired or was cleared on the server. Run a new analysis from the form to chat with full context (property, documents, and insights).";

pub const CHAT_UNCONFIGURED_REPLY: &str = "Chat is not configured (missing Anthropic/OpenAI API keys). Configure ANTHROPIC_API_KEY or OPENAI_API_KEY to enable chat.";

pub const EMPTY_REPLY: &str = "I couldn't generate a response. Please try rephrasing.";

/// Answer one message. Provider problems become a reply, never an error.
pub async fn answer_chat(adapter: &ProviderAdapter, record: &SessionRecord, message: &str) -> String {
    let system = prompts::chat_system(record);
    match adapter
        .generate(record.llm_provider, &system, message, None)
        .await
    {
        Ok(Generated::Served { provider, output }) => {
            tracing::info!("[chat] reply from {}: {} chars", provider, output.len());
            if output.trim().is_empty() {
                EMPTY_REPLY.to_string()
            } else {
                output
            }
        }
        Ok(Generated::Unconfigured) => CHAT_UNCONFIGURED_REPLY.to_string(),
        Err(e) => {
            tracing::warn!("[chat] provider error: {}", e);
            format!("Sorry, an error occurred: {}", e)
        }
    }
}
