//! Chat over a session's context.

use std::sync::Arc;
use std::time::Duration;

use lease_insight::services::engine::collect_events;
use lease_insight::services::research::chat::{CHAT_UNCONFIGURED_REPLY, EMPTY_REPLY, SESSION_EXPIRED_REPLY};
use lease_insight::services::{NoEntitlements, SessionEngine};
use lease_insight::storage::{SessionStoreExt, SqliteSessionStore};
use lease_insight::AppError;
use lease_insight_llm::{NoSearch, ProviderType};

use crate::support::*;

#[tokio::test]
async fn test_chat_answers_with_session_context() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_batch() {
            cards_reply(call.topics().iter().map(|t| card_json(t)).collect())
        } else if call.is_dashboard() {
            dashboard_reply()
        } else {
            reply("Ask for $46/sf with a 5 year term.")
        }
    });
    let engine = engine(Some(provider.clone()));
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    collect_events(engine.stream_analysis(&session_id)).await;

    let answer = engine
        .chat(&session_id, "  What should I offer?  ", None)
        .await
        .unwrap();
    assert_eq!(answer, "Ask for $46/sf with a 5 year term.");

    let call = provider.calls().pop().unwrap();
    assert_eq!(call.user, "What should I offer?");
    assert!(call.system.contains("Acme Plaza"));
    assert!(call.system.contains("Footfall"));
}

#[tokio::test]
async fn test_chat_degraded_replies() {
    let provider = ScriptedProvider::new(|call| {
        if call.user.contains("fail") {
            failure()
        } else {
            reply("   ")
        }
    });
    let chatty = engine(Some(provider));
    let session_id = chatty.start_session(acme_plaza()).await.unwrap();

    let answer = chatty.chat(&session_id, "please fail", None).await.unwrap();
    assert!(answer.starts_with("Sorry, an error occurred: "));

    let answer = chatty.chat(&session_id, "hello", None).await.unwrap();
    assert_eq!(answer, EMPTY_REPLY);

    let unconfigured = engine(None);
    let other = unconfigured.start_session(acme_plaza()).await.unwrap();
    assert_eq!(
        unconfigured.chat(&other, "hello", None).await.unwrap(),
        CHAT_UNCONFIGURED_REPLY
    );
}

#[tokio::test]
async fn test_chat_validation_order() {
    let engine = engine(None);
    // An expired session wins over an empty message
    assert_eq!(engine.chat("missing", "", None).await.unwrap(), SESSION_EXPIRED_REPLY);

    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    let err = engine.chat(&session_id, "   ", None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_chat_records_provider_switch() {
    let store = SqliteSessionStore::in_memory(Duration::from_secs(3600)).unwrap();
    let provider = ScriptedProvider::new(|_| reply("ok"));
    let engine = SessionEngine::new(
        Arc::new(store.clone()),
        adapter(Some(provider), Arc::new(NoSearch)),
        Arc::new(NoEntitlements),
    );
    let session_id = engine.start_session(acme_plaza()).await.unwrap();
    assert_eq!(
        store.load_record(&session_id).unwrap().unwrap().llm_provider,
        ProviderType::OpenAI
    );

    // Anthropic is not configured here, so the reply still comes from OpenAI
    let answer = engine.chat(&session_id, "hello", Some("Claude")).await.unwrap();
    assert_eq!(answer, "ok");
    assert_eq!(
        store.load_record(&session_id).unwrap().unwrap().llm_provider,
        ProviderType::Anthropic
    );
}
