//! Custom-card creation, card edits and confirmation.

use std::time::Duration;

use serde_json::json;

use lease_insight::services::engine::{
    collect_events, CARD_NOT_FOUND, CUSTOM_CARD_FAILED, CUSTOM_CARD_STEPS, EDIT_FAILED, EDIT_STEPS,
};
use lease_insight::services::research::orchestrator::UNCONFIGURED_WHY;
use lease_insight_core::{AnalysisEvent, CardCollection, DoneResult, Impact, InsightCard};

use crate::support::*;

fn progress_messages(events: &[AnalysisEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            AnalysisEvent::Progress { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn done(events: &[AnalysisEvent]) -> DoneResult {
    match events.last() {
        Some(AnalysisEvent::Done(result)) => result.clone(),
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_custom_card_progress_cadence() {
    let provider = ScriptedProvider::slow(Duration::from_secs(7), |call| {
        assert!(call.is_custom_card());
        assert!(call.user.contains("Parking ratio"));
        cards_reply(vec![card_json("Parking ratio vs peers")])
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    let events = collect_events(engine.stream_custom_card(&session_id, "Parking ratio").await.unwrap()).await;

    // Ticks at 0s, 3s and 6s; the reply lands at 7s
    assert_eq!(progress_messages(&events), CUSTOM_CARD_STEPS[..3].to_vec());
    let result = done(&events);
    assert_eq!(result.index, Some(0));
    assert_eq!(result.card.as_ref().unwrap().title, "Parking ratio vs peers");

    let stored = engine.custom_cards(&session_id).unwrap();
    assert_eq!(stored, vec![result.card.unwrap()]);
}

#[tokio::test(start_paused = true)]
async fn test_progress_cycles_through_all_steps() {
    let provider = ScriptedProvider::slow(Duration::from_secs(29), |_| {
        cards_reply(vec![card_json("Slow card")])
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    let events = collect_events(engine.stream_custom_card(&session_id, "Slow").await.unwrap()).await;
    let messages = progress_messages(&events);
    assert_eq!(messages.len(), 10);
    assert_eq!(messages[9], CUSTOM_CARD_STEPS[0]);
}

#[tokio::test(start_paused = true)]
async fn test_fast_reply_skips_remaining_ticks() {
    let provider = ScriptedProvider::slow(Duration::from_millis(500), |_| {
        cards_reply(vec![card_json("Quick")])
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    let start = tokio::time::Instant::now();
    let events = collect_events(engine.stream_custom_card(&session_id, "Quick").await.unwrap()).await;
    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(progress_messages(&events).len(), 1);
    assert!(matches!(events.last(), Some(AnalysisEvent::Done(_))));
}

#[tokio::test]
async fn test_custom_cards_append_in_order() {
    let provider = ScriptedProvider::new(|call| {
        let topic = call.user.lines().last().unwrap_or_default().to_string();
        cards_reply(vec![card_json(&format!("Card for {}", topic.len()))])
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    for (expected, prompt) in ["a", "bb", "ccc"].iter().enumerate() {
        let events = collect_events(engine.stream_custom_card(&session_id, prompt).await.unwrap()).await;
        assert_eq!(done(&events).index, Some(expected));
    }
    assert_eq!(engine.custom_cards(&session_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_custom_card_failures() {
    let provider = ScriptedProvider::new(|call| {
        if call.user.contains("garbage") {
            reply("no cards here")
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();

    for prompt in ["garbage", "upstream"] {
        let events = collect_events(engine.stream_custom_card(&session_id, prompt).await.unwrap()).await;
        assert_eq!(events.last(), Some(&AnalysisEvent::error(CUSTOM_CARD_FAILED)));
    }
    assert!(engine.custom_cards(&session_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfigured_custom_card_is_placeholder() {
    let engine = engine(None);
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let events = collect_events(engine.stream_custom_card(&session_id, "  Parking ratio ").await.unwrap()).await;

    let card = done(&events).card.unwrap();
    assert_eq!(card.title, "Parking ratio");
    assert_eq!(card.confidence_score, 0);
    assert_eq!(card.why_it_matters, UNCONFIGURED_WHY);
}

fn numbered_card(i: usize) -> InsightCard {
    InsightCard {
        title: format!("Custom {}", i),
        impact: Impact::Neutral,
        confidence_score: 50,
        source: "User document".to_string(),
        insight: Some(format!("Insight {}", i)),
        data_evidence: "No data".to_string(),
        why_it_matters: "Context for the renewal.".to_string(),
        baseline_pct: Some(30),
        current_trend_pct: None,
        source_url: None,
    }
}

/// Session with five custom cards created through the engine.
async fn session_with_five_cards(engine: &lease_insight::SessionEngine) -> String {
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    for i in 0..5 {
        let events = collect_events(
            engine
                .stream_custom_card(&session_id, &format!("Custom {}", i))
                .await
                .unwrap(),
        )
        .await;
        assert!(matches!(events.last(), Some(AnalysisEvent::Done(_))));
    }
    session_id
}

#[tokio::test]
async fn test_edit_is_a_draft_until_confirmed() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_edit() {
            assert!(call.user.contains("Custom 2"));
            let mut card = card_json("Custom 2 (revised)");
            card["impact"] = "negative".into();
            card["source_url"] = json!("https://example.com/report");
            cards_reply(vec![card])
        } else {
            let prompt = call.user.lines().rev().find(|l| l.contains("Custom")).unwrap_or_default();
            let title = prompt.split("Custom").nth(1).unwrap_or_default().trim().to_string();
            let mut card = serde_json::to_value(numbered_card(title.parse().unwrap_or(0))).unwrap();
            card["title"] = json!(format!("Custom {}", title));
            cards_reply(vec![card])
        }
    });
    let engine = engine(Some(provider));
    let session_id = session_with_five_cards(&engine).await;
    let before = engine.custom_cards(&session_id).unwrap();
    assert_eq!(before.len(), 5);

    let events = collect_events(
        engine
            .stream_card_edit(&session_id, 2, "Make it about rising vacancy", CardCollection::Custom)
            .unwrap(),
    )
    .await;
    let result = done(&events);
    assert_eq!(result.index, Some(2));
    assert_eq!(result.source, Some(CardCollection::Custom));
    assert_eq!(result.original.as_ref(), Some(&before[2]));
    let updated = result.updated.unwrap();
    assert_eq!(updated.title, "Custom 2 (revised)");
    assert_eq!(updated.impact, Impact::Negative);
    assert!(progress_messages(&events).iter().all(|m| EDIT_STEPS.contains(&m.as_str())));

    // Proposing changed nothing
    assert_eq!(engine.custom_cards(&session_id).unwrap(), before);

    engine
        .confirm_card_edit(&session_id, 2, CardCollection::Custom, updated.clone())
        .await
        .unwrap();
    let after = engine.custom_cards(&session_id).unwrap();
    assert_eq!(after[2], updated);
    assert_eq!(after[..2], before[..2]);
    assert_eq!(after[3..], before[3..]);

    // Confirming again leaves the same state
    engine
        .confirm_card_edit(&session_id, 2, CardCollection::Custom, updated)
        .await
        .unwrap();
    assert_eq!(engine.custom_cards(&session_id).unwrap(), after);
}

#[tokio::test]
async fn test_edit_validation_cards() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            cards_reply(call.topics().iter().map(|t| card_json(t)).collect())
        } else if call.is_dashboard() {
            dashboard_reply()
        } else if call.is_edit() {
            cards_reply(vec![card_json("Footfall (weekend)")])
        } else {
            failure()
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    collect_events(engine.stream_analysis(&session_id)).await;

    let events = collect_events(
        engine
            .stream_card_edit(&session_id, 7, "Focus on weekends", CardCollection::Validation)
            .unwrap(),
    )
    .await;
    let updated = done(&events).updated.unwrap();
    engine
        .confirm_card_edit(&session_id, 7, CardCollection::Validation, updated.clone())
        .await
        .unwrap();

    let cards = engine.dashboard(&session_id).unwrap().cards;
    assert_eq!(cards[7], updated);
    assert!(engine.custom_cards(&session_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_edit_errors() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_edit() {
            failure()
        } else {
            cards_reply(vec![card_json("Only card")])
        }
    });
    let engine = engine(Some(provider));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    collect_events(engine.stream_custom_card(&session_id, "Only").await.unwrap()).await;

    let events = collect_events(
        engine
            .stream_card_edit(&session_id, 5, "anything", CardCollection::Custom)
            .unwrap(),
    )
    .await;
    assert_eq!(events, vec![AnalysisEvent::error(CARD_NOT_FOUND)]);

    let events = collect_events(
        engine
            .stream_card_edit(&session_id, 0, "anything", CardCollection::Custom)
            .unwrap(),
    )
    .await;
    assert_eq!(events.last(), Some(&AnalysisEvent::error(EDIT_FAILED)));
}

#[tokio::test]
async fn test_unconfigured_edit_proposes_original() {
    let engine = engine(None);
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    collect_events(engine.stream_custom_card(&session_id, "Parking").await.unwrap()).await;

    let events = collect_events(
        engine
            .stream_card_edit(&session_id, 0, "shorter", CardCollection::Custom)
            .unwrap(),
    )
    .await;
    let result = done(&events);
    assert_eq!(result.original, result.updated);
}
