//! Full-analysis flow through the session engine.

use std::sync::Arc;

use lease_insight::services::engine::{collect_events, SESSION_NOT_FOUND};
use lease_insight::services::research::orchestrator::UNCONFIGURED_WHY;
use lease_insight::services::research::topics::{batches, BATCH_SIZE, CARD_TOPICS};
use lease_insight::services::research::BatchOrchestrator;
use lease_insight_core::card::{NO_DATA, SOURCE_NOT_AVAILABLE};
use lease_insight_core::{AnalysisEvent, Impact, RecommendationsSource};
use lease_insight_llm::{NoSearch, ProviderType};

use crate::support::*;

fn cards_events(events: &[AnalysisEvent]) -> Vec<(usize, Vec<String>)> {
    events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Cards { cards, batch_index } => Some((
                *batch_index,
                cards.iter().map(|c| c.title.clone()).collect(),
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_full_analysis_one_card_per_topic() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            cards_reply(call.topics().iter().map(|t| card_json(t)).collect())
        } else if call.is_dashboard() {
            dashboard_reply()
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider.clone()));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    let events = collect_events(engine.stream_analysis(&session_id)).await;

    let batches = cards_events(&events);
    assert_eq!(
        batches.iter().map(|(i, c)| (*i, c.len())).collect::<Vec<_>>(),
        vec![(1, 5), (2, 5), (3, 5), (4, 1)]
    );

    let n = events.len();
    assert!(matches!(events[n - 2], AnalysisEvent::Dashboard { .. }));
    assert_eq!(events[n - 1], AnalysisEvent::done());
    assert_eq!(
        events.iter().filter(|e| matches!(e, AnalysisEvent::Dashboard { .. })).count(),
        1
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    // One progress event per topic, announced with the topic
    let topics: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Progress { topic: Some(t), .. } => Some(t.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(topics, CARD_TOPICS.iter().map(|t| t.to_string()).collect::<Vec<_>>());

    let view = engine.dashboard(&session_id).unwrap();
    assert_eq!(view.cards.len(), 16);
    assert!(view.cards.iter().all(|c| c.impact == Impact::Positive));

    let summary = view.dashboard_summary.unwrap();
    assert_eq!(summary.fair_market_rent, 46.0);
    assert_eq!(summary.vs_current_pct, -8.0);
    assert_eq!(summary.portfolio_context.comparison_pct, -8.0);
    assert_eq!(
        summary.portfolio_context.comparison_text,
        "This property's rent is 8.00% below the average rent for similar properties."
    );
    assert_eq!(summary.recommendations_source, RecommendationsSource::OpenAI);

    // Dashboard event carries the property alongside the summary
    let AnalysisEvent::Dashboard { data } = &events[n - 2] else {
        unreachable!()
    };
    assert_eq!(data.property.name, "Acme Plaza");
    assert_eq!(data.summary, summary);

    assert_eq!(provider.calls().iter().filter(|c| c.is_batch()).count(), 4);
}

#[tokio::test]
async fn test_cross_batch_duplicate_titles_keep_first() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            let topics = call.topics();
            let mut cards: Vec<_> = topics.iter().map(|t| card_json(t)).collect();
            if topics.len() == BATCH_SIZE && !topics[0].starts_with("Income") {
                // Every later batch repeats a batch-1 title in another case
                let mut repeat = card_json("  INCOME SHIFTS (LOCAL INCOME, HIGHER/LOWER VS EXPECTED) ");
                repeat["impact"] = "negative".into();
                cards.push(repeat);
            }
            cards_reply(cards)
        } else if call.is_dashboard() {
            dashboard_reply()
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let events = collect_events(engine.stream_analysis(&session_id)).await;

    let cards = engine.dashboard(&session_id).unwrap().cards;
    assert_eq!(cards.len(), 16);
    let income: Vec<_> = cards
        .iter()
        .filter(|c| c.title.to_lowercase().starts_with("income shifts"))
        .collect();
    assert_eq!(income.len(), 1);
    assert_eq!(income[0].impact, Impact::Positive);
    assert_eq!(income[0].title, CARD_TOPICS[0]);

    // The suppressed duplicates never reach the stream either
    let streamed: usize = cards_events(&events).iter().map(|(_, c)| c.len()).sum();
    assert_eq!(streamed, 16);
}

#[tokio::test]
async fn test_failed_batch_does_not_abort_analysis() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            let topics = call.topics();
            if topics.iter().any(|t| t.starts_with("Footfall")) {
                return failure();
            }
            if topics.len() == 1 {
                return reply("this is not json");
            }
            cards_reply(topics.iter().map(|t| card_json(t)).collect())
        } else if call.is_dashboard() {
            dashboard_reply()
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let events = collect_events(engine.stream_analysis(&session_id)).await;

    // Batch 2 failed and batch 4 was unparseable: no cards events for them
    let indices: Vec<usize> = cards_events(&events).iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(events.last(), Some(&AnalysisEvent::done()));
    assert_eq!(engine.dashboard(&session_id).unwrap().cards.len(), 10);
}

#[tokio::test]
async fn test_zero_baseline_is_stored_as_null() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            let cards = call
                .topics()
                .iter()
                .map(|t| {
                    let mut card = card_json(t);
                    card["baseline_pct"] = 0.into();
                    card["current_trend_pct"] = "62%".into();
                    card
                })
                .collect();
            cards_reply(cards)
        } else if call.is_dashboard() {
            dashboard_reply()
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    collect_events(engine.stream_analysis(&session_id)).await;

    let cards = engine.dashboard(&session_id).unwrap().cards;
    assert!(!cards.is_empty());
    for card in &cards {
        assert_eq!(card.baseline_pct, None);
        assert_eq!(card.current_trend_pct, Some(62));
    }
    let json = serde_json::to_value(&cards[0]).unwrap();
    assert!(json["baseline_pct"].is_null());
}

#[tokio::test]
async fn test_unconfigured_batch_yields_placeholders() {
    let orchestrator = BatchOrchestrator::new(adapter(None, Arc::new(NoSearch)));
    let record = plaza_record(ProviderType::Anthropic);

    for batch in batches(&CARD_TOPICS, BATCH_SIZE) {
        let cards = orchestrator.run_batch(&record, batch, None).await;
        assert_eq!(cards.len(), batch.topics.len());
        for (card, topic) in cards.iter().zip(batch.topics) {
            assert_eq!(card.title, *topic);
            assert_eq!(card.confidence_score, 0);
            assert_eq!(card.source, SOURCE_NOT_AVAILABLE);
            assert_eq!(card.data_evidence, NO_DATA);
            assert_eq!(card.impact, Impact::Neutral);
            assert_eq!(card.why_it_matters, UNCONFIGURED_WHY);
        }
    }
}

#[tokio::test]
async fn test_unconfigured_analysis_completes_with_fallback_dashboard() {
    let engine = engine(None);
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let events = collect_events(engine.stream_analysis(&session_id)).await;

    assert_eq!(events.last(), Some(&AnalysisEvent::done()));
    let view = engine.dashboard(&session_id).unwrap();
    assert_eq!(view.cards.len(), 16);
    let summary = view.dashboard_summary.unwrap();
    assert_eq!(summary.recommendations_source, RecommendationsSource::Fallback);
    assert_eq!(summary.fair_market_rent, 50.0);
    assert_eq!(summary.confidence_score, 0);
}

#[tokio::test]
async fn test_unknown_session_emits_only_error() {
    let engine = engine(None);
    let events = collect_events(engine.stream_analysis("no-such-session")).await;
    assert_eq!(events, vec![AnalysisEvent::error(SESSION_NOT_FOUND)]);
}
