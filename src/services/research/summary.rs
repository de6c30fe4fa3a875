//! Document summary for uploaded files.

use serde::Serialize;

use lease_insight_llm::{Generated, ProviderAdapter, ProviderType};

use super::prompts::SUMMARY_SYSTEM;
use crate::services::extraction::is_marker;

/// Longest document text sent for summarising.
pub const MAX_SUMMARY_CHARS: usize = 120_000;

const TRUNCATION_NOTE: &str = "\n\n[Document truncated for length.]";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub error: Option<String>,
}

impl DocumentSummary {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Summarise extracted text. Empty text and extraction markers are skipped.
pub async fn summarize(adapter: &ProviderAdapter, text: &str) -> DocumentSummary {
    if text.trim().is_empty() || is_marker(text) {
        return DocumentSummary::default();
    }

    let mut body: String = text.chars().take(MAX_SUMMARY_CHARS).collect();
    if text.chars().count() > MAX_SUMMARY_CHARS {
        body.push_str(TRUNCATION_NOTE);
    }

    match adapter
        .generate(ProviderType::OpenAI, SUMMARY_SYSTEM, &body, None)
        .await
    {
        Ok(Generated::Served { output, .. }) => {
            tracing::info!("[summary] received {} chars", output.len());
            split_summary(&output)
        }
        Ok(Generated::Unconfigured) => {
            tracing::warn!("[summary] no provider configured; skipping summary");
            DocumentSummary::failed("LLM provider not configured")
        }
        Err(e) => {
            tracing::warn!("[summary] provider error: {}", e);
            DocumentSummary::failed(e.to_string())
        }
    }
}

/// First non-empty line is the summary; the rest are key points without
/// bullet markers.
pub fn split_summary(reply: &str) -> DocumentSummary {
    let mut lines = reply.lines().map(str::trim).filter(|l| !l.is_empty());
    let summary = lines.next().unwrap_or_default().to_string();
    let key_points = lines
        .map(|l| l.trim_start_matches(['-', '•', '*', ' ']).trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    DocumentSummary {
        summary,
        key_points,
        error: None,
    }
}
