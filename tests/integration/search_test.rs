//! Search-grounded batches: the tool loop and citation backfill.

use serde_json::json;

use lease_insight::services::research::topics::{batches, BATCH_SIZE, CARD_TOPICS};
use lease_insight::services::research::BatchOrchestrator;
use lease_insight_llm::ProviderType;

use crate::support::*;

const EVIDENCE: [&str; 3] = [
    "https://data.example.com/vacancy",
    "https://news.example.com/retail-rents",
    "https://stats.example.com/footfall",
];

fn uncited_cards(call: &Call) -> Vec<serde_json::Value> {
    call.topics().iter().map(|t| card_json(t)).collect()
}

#[tokio::test]
async fn test_uncited_cards_take_evidence_urls_in_order() {
    let provider = ScriptedProvider::new(|call| {
        if !call.has_tool_results {
            search_call("Acme Plaza retail vacancy")
        } else {
            cards_reply(uncited_cards(call))
        }
    });
    let orchestrator = BatchOrchestrator::new(adapter(
        Some(provider.clone()),
        FixedSearch::with_urls(&EVIDENCE),
    ));
    let record = plaza_record(ProviderType::OpenAI);
    let batch = batches(&CARD_TOPICS, BATCH_SIZE).remove(0);

    let cards = orchestrator.run_batch(&record, batch, None).await;

    assert_eq!(cards.len(), 5);
    let urls: Vec<Option<&str>> = cards.iter().map(|c| c.source_url.as_deref()).collect();
    assert_eq!(
        urls,
        vec![Some(EVIDENCE[0]), Some(EVIDENCE[1]), Some(EVIDENCE[2]), None, None]
    );

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].has_tool_results);
    assert!(calls[1].has_tool_results);
    assert!(calls[0].system.contains(lease_insight::services::research::prompts::SEARCH_TOOL_INSTRUCTIONS.trim()));
}

#[tokio::test]
async fn test_cited_urls_are_restricted_to_evidence() {
    let provider = ScriptedProvider::new(|call| {
        if !call.has_tool_results {
            return search_call("Acme Plaza footfall");
        }
        let mut cards = uncited_cards(call);
        // A real citation, an invented one and a repeat of the first
        cards[0]["source_url"] = json!(EVIDENCE[2]);
        cards[1]["source_url"] = json!("https://invented.example.org/report");
        cards[2]["source_url"] = json!(EVIDENCE[2]);
        cards_reply(cards)
    });
    let orchestrator = BatchOrchestrator::new(adapter(
        Some(provider),
        FixedSearch::with_urls(&EVIDENCE),
    ));
    let record = plaza_record(ProviderType::OpenAI);
    let batch = batches(&CARD_TOPICS, BATCH_SIZE).remove(0);

    let cards = orchestrator.run_batch(&record, batch, None).await;
    let urls: Vec<Option<&str>> = cards.iter().map(|c| c.source_url.as_deref()).collect();
    assert_eq!(
        urls,
        vec![Some(EVIDENCE[2]), Some(EVIDENCE[0]), Some(EVIDENCE[1]), None, None]
    );
}

#[tokio::test]
async fn test_search_grounded_full_analysis() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_dashboard() {
            dashboard_reply()
        } else if !call.has_tool_results {
            search_call("Acme Plaza market")
        } else {
            cards_reply(uncited_cards(call))
        }
    });
    let engine = engine_with_search(Some(provider), FixedSearch::with_urls(&EVIDENCE));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let events = lease_insight::services::engine::collect_events(engine.stream_analysis(&session_id)).await;
    assert_eq!(events.last(), Some(&lease_insight_core::AnalysisEvent::done()));

    let cards = engine.dashboard(&session_id).unwrap().cards;
    assert_eq!(cards.len(), 16);
    // Each batch has its own evidence list, so every batch cites from the top
    for chunk in cards.chunks(BATCH_SIZE) {
        assert_eq!(chunk[0].source_url.as_deref(), Some(EVIDENCE[0]));
    }
}
