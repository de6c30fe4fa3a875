//! Analysis Stream Events
//!
//! Wire events for the three long-running flows (full analysis, custom card,
//! card edit). Each event serializes to one JSON object with a `type`
//! discriminator; a stream is newline-delimited JSON (NDJSON).

use serde::{Deserialize, Serialize};

use crate::card::InsightCard;
use crate::dashboard::DashboardPayload;
use crate::error::{CoreError, CoreResult};

/// Which collection of a session a card belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardCollection {
    /// Cards produced by the batch analysis
    Validation,
    /// Cards created on demand from a user prompt
    Custom,
}

impl CardCollection {
    /// Lenient parse of `"validation"` / `"custom"`.
    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "validation" => Ok(Self::Validation),
            "custom" => Ok(Self::Custom),
            _ => Err(CoreError::validation(
                "source must be 'validation' or 'custom'",
            )),
        }
    }
}

/// Result carried by a `done` event.
///
/// Empty for the full-analysis flow; `card` + `index` for custom-card
/// creation; `original` + `updated` + `index` + `source` for an edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoneResult {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub card: Option<InsightCard>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original: Option<InsightCard>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated: Option<InsightCard>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<CardCollection>,
}

/// One event of an analysis stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Human-readable status update
    Progress {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        topic: Option<String>,
    },

    /// Deduplicated cards of one batch (1-based index)
    Cards {
        cards: Vec<InsightCard>,
        batch_index: usize,
    },

    /// Final dashboard merged with the property descriptor
    Dashboard { data: DashboardPayload },

    /// Terminal success
    Done(DoneResult),

    /// Terminal failure
    Error { message: String },
}

impl AnalysisEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
            topic: None,
        }
    }

    pub fn topic_progress(message: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
            topic: Some(topic.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn done() -> Self {
        Self::Done(DoneResult::default())
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error { .. })
    }

    /// Serialize as a single NDJSON line (with trailing newline).
    pub fn to_ndjson_line(&self) -> CoreResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
