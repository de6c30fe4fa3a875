//! Insight Card Model
//!
//! One structured finding about a research topic for a property/lease.
//! Cards arrive here already normalized; the permissive parsing of raw model
//! output lives in the application crate.

use serde::{Deserialize, Serialize};

/// Negotiation impact of an insight, relative to the requester's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Neutral,
    Negative,
}

impl Impact {
    /// Lenient parse: unknown labels become `Neutral`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "positive" => Impact::Positive,
            "negative" => Impact::Negative,
            _ => Impact::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Positive => "positive",
            Impact::Neutral => "neutral",
            Impact::Negative => "negative",
        }
    }
}

impl Default for Impact {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source label used when a card has no data behind it.
pub const SOURCE_NOT_AVAILABLE: &str = "Not available";

/// Evidence text used when a card has no data behind it.
pub const NO_DATA: &str = "No data";

/// A validated insight card.
///
/// Optional fields serialize as `null` rather than being omitted so clients
/// always see the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightCard {
    pub title: String,
    pub impact: Impact,
    /// 0-100
    pub confidence_score: u8,
    /// Short label (at most four words) or "Not available"
    pub source: String,
    #[serde(default)]
    pub insight: Option<String>,
    pub data_evidence: String,
    pub why_it_matters: String,
    /// 1-100, never 0
    #[serde(default)]
    pub baseline_pct: Option<u8>,
    /// 1-100, never 0
    #[serde(default)]
    pub current_trend_pct: Option<u8>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl InsightCard {
    /// Zero-confidence card for a topic that could not be researched.
    pub fn placeholder(title: impl Into<String>, why_it_matters: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            impact: Impact::Neutral,
            confidence_score: 0,
            source: SOURCE_NOT_AVAILABLE.to_string(),
            insight: None,
            data_evidence: NO_DATA.to_string(),
            why_it_matters: why_it_matters.into(),
            baseline_pct: None,
            current_trend_pct: None,
            source_url: None,
        }
    }

    /// Key used for title uniqueness: trimmed and case-folded.
    pub fn title_key(&self) -> String {
        title_key(&self.title)
    }
}

/// Normalized form of a card title used for deduplication.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}
