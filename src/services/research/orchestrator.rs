//! Batch Orchestrator
//!
//! Drives the topic list through the provider adapter batch by batch,
//! merges the results and derives the dashboard summary.
//!
//! Batches run strictly in order: a title seen in an earlier batch wins and
//! any later card with the same title is dropped without notice.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use lease_insight_core::dashboard::NO_RECOMMENDATION;
use lease_insight_core::{
    pct_delta, AnalysisEvent, DashboardSummary, InsightCard, PortfolioContext, Recommendations,
    RecommendationsSource,
};
use lease_insight_llm::{Generated, JsonRequest, ProviderAdapter, ProviderType, SearchRequest};

use super::normalizer::CardNormalizer;
use super::prompts;
use super::send_event;
use super::topics::{batches, short_topic, TopicBatch, BATCH_SIZE, CARD_TOPICS};
use crate::models::session::SessionRecord;

/// Why-it-matters text of placeholder cards when no provider is configured.
pub const UNCONFIGURED_WHY: &str = "Enable LLM provider API keys for research.";

/// Cards and dashboard produced by one full analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub cards: Vec<InsightCard>,
    pub dashboard: DashboardSummary,
}

pub struct BatchOrchestrator {
    adapter: Arc<ProviderAdapter>,
    topics: Vec<&'static str>,
    batch_size: usize,
}

impl BatchOrchestrator {
    pub fn new(adapter: Arc<ProviderAdapter>) -> Self {
        Self {
            adapter,
            topics: CARD_TOPICS.to_vec(),
            batch_size: BATCH_SIZE,
        }
    }

    /// Run every batch, emitting progress and per-batch cards, then build
    /// the dashboard. Terminal events are left to the caller.
    pub async fn analyze(
        &self,
        record: &SessionRecord,
        events: &mpsc::Sender<AnalysisEvent>,
    ) -> AnalysisOutcome {
        tracing::info!(
            "[orchestrator] starting analysis: {} topics, provider={}",
            self.topics.len(),
            record.llm_provider
        );

        let mut seen = HashSet::new();
        let mut all_cards = Vec::new();

        for batch in batches(&self.topics, self.batch_size) {
            for topic in batch.topics {
                send_event(
                    events,
                    AnalysisEvent::topic_progress(format!("Analyzing {}...", short_topic(topic)), *topic),
                )
                .await;
            }

            let cards = self.run_batch(record, batch, Some(events)).await;
            let produced = cards.len();
            let unique = retain_unseen(&mut seen, cards);
            tracing::info!(
                "[orchestrator] batch {} returned {} cards, {} unique",
                batch.index,
                produced,
                unique.len()
            );

            if !unique.is_empty() {
                all_cards.extend(unique.iter().cloned());
                send_event(
                    events,
                    AnalysisEvent::Cards {
                        cards: unique,
                        batch_index: batch.index,
                    },
                )
                .await;
            }
        }

        let dashboard = self.dashboard(record, &all_cards).await;
        AnalysisOutcome {
            cards: all_cards,
            dashboard,
        }
    }

    /// One batch through the adapter and the normaliser.
    ///
    /// Provider failures yield an empty list; an unconfigured adapter yields
    /// one zero-confidence placeholder per topic.
    pub async fn run_batch(
        &self,
        record: &SessionRecord,
        batch: TopicBatch<'_>,
        progress: Option<&mpsc::Sender<AnalysisEvent>>,
    ) -> Vec<InsightCard> {
        let request = SearchRequest {
            system: prompts::RESEARCH_SYSTEM.to_string(),
            tool_instructions: prompts::SEARCH_TOOL_INSTRUCTIONS.to_string(),
            query_system: prompts::QUERY_PLANNER_SYSTEM.to_string(),
            user: prompts::batch_user_message(record, batch.topics),
            topics: batch.topics.iter().map(|t| t.to_string()).collect(),
            property_name: record.property_name.clone(),
            address: record.address.clone(),
        };

        let output = match self
            .adapter
            .generate_with_search(record.llm_provider, &request, progress)
            .await
        {
            Ok(Generated::Served { output, .. }) => output,
            Ok(Generated::Unconfigured) => {
                tracing::warn!(
                    "[orchestrator] no provider configured; placeholder cards for batch {}",
                    batch.index
                );
                return batch
                    .topics
                    .iter()
                    .map(|t| InsightCard::placeholder(*t, UNCONFIGURED_WHY))
                    .collect();
            }
            Err(e) => {
                tracing::warn!("[orchestrator] batch {} failed: {}", batch.index, e);
                return Vec::new();
            }
        };

        let cards = CardNormalizer::new(record.analyze_as)
            .with_allowed_urls(&output.evidence_urls)
            .normalize_text(&output.text);
        if let Some(tx) = progress {
            send_event(
                tx,
                AnalysisEvent::progress(format!("Completed analysis: {} insights found", cards.len())),
            )
            .await;
        }
        cards
    }

    /// Dashboard summary from the accumulated cards.
    ///
    /// Any failure, and an empty card set, produce the fallback record.
    pub async fn dashboard(&self, record: &SessionRecord, cards: &[InsightCard]) -> DashboardSummary {
        let current = record.property().current_rent();
        if cards.is_empty() {
            tracing::warn!("[orchestrator] no cards; dashboard falls back");
            return DashboardSummary::fallback(current);
        }

        let request = JsonRequest {
            system: prompts::dashboard_system(false),
            enhanced_system: Some(prompts::dashboard_system(true)),
            user: prompts::dashboard_user_message(record, current, cards),
            schema: prompts::dashboard_schema(),
        };

        match self.adapter.generate_json(record.llm_provider, &request).await {
            Ok(Generated::Served { provider, output }) => {
                let summary = parse_dashboard(&output, current, provenance(provider));
                tracing::info!(
                    "[orchestrator] dashboard from {}: fair_rent={} vs_current_pct={} confidence={}",
                    provider,
                    summary.fair_market_rent,
                    summary.vs_current_pct,
                    summary.confidence_score
                );
                summary
            }
            Ok(Generated::Unconfigured) => {
                tracing::warn!("[orchestrator] no provider configured; dashboard falls back");
                DashboardSummary::fallback(current)
            }
            Err(e) => {
                tracing::warn!("[orchestrator] dashboard generation failed: {}", e);
                DashboardSummary::fallback(current)
            }
        }
    }
}

/// Keep cards whose title has not been seen, recording the new titles.
pub fn retain_unseen(seen: &mut HashSet<String>, cards: Vec<InsightCard>) -> Vec<InsightCard> {
    cards
        .into_iter()
        .filter(|c| {
            let key = c.title_key();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

fn provenance(provider: ProviderType) -> RecommendationsSource {
    match provider {
        ProviderType::OpenAI => RecommendationsSource::OpenAI,
        ProviderType::Anthropic => RecommendationsSource::Anthropic,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().trim_start_matches('$').parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn recommendation(value: Option<&Value>) -> String {
    let t = text(value);
    if t.is_empty() {
        NO_RECOMMENDATION.to_string()
    } else {
        t
    }
}

/// Build a dashboard from provider JSON.
///
/// Percentages are recomputed from the rents; the provider's own
/// percentage figures are ignored.
pub fn parse_dashboard(value: &Value, current: f64, source: RecommendationsSource) -> DashboardSummary {
    let empty = Value::Null;
    let rec = value.get("recommendations").unwrap_or(&empty);
    let port = value.get("portfolio_context").unwrap_or(&empty);

    let fair = number(value.get("fair_market_rent")).unwrap_or(current);
    let this_rent = number(port.get("this_property_rent")).unwrap_or(fair);
    let avg_rent = number(port.get("portfolio_avg_rent")).unwrap_or(current);
    let comparison_pct = pct_delta(this_rent, avg_rent);

    let mut comparison_text = text(port.get("comparison_text"));
    if comparison_text.is_empty() && avg_rent != 0.0 {
        comparison_text = format!(
            "This property's rent is {:.2}% {} the average rent for similar properties.",
            comparison_pct.abs(),
            if comparison_pct < 0.0 { "below" } else { "above" }
        );
    }

    let confidence = number(value.get("confidence_score"))
        .map(|c| c.trunc().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    DashboardSummary {
        fair_market_rent: fair,
        confidence_score: confidence,
        vs_current_pct: pct_delta(fair, current),
        recommendations: Recommendations {
            ideal_term: recommendation(rec.get("ideal_term")),
            ideal_term_reasoning: text(rec.get("ideal_term_reasoning")),
            negotiation_leverage: recommendation(rec.get("negotiation_leverage")),
            negotiation_leverage_reasoning: text(rec.get("negotiation_leverage_reasoning")),
            renewals: recommendation(rec.get("renewals")),
            renewals_reasoning: text(rec.get("renewals_reasoning")),
        },
        portfolio_context: PortfolioContext {
            this_property_rent: this_rent,
            portfolio_avg_rent: avg_rent,
            comparison_pct,
            comparison_text,
        },
        recommendations_source: source,
    }
}
