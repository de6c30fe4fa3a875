//! HTTP surface: routing, status codes, error bodies and NDJSON streams.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use lease_insight::api::create_router;
use lease_insight::services::research::chat::SESSION_EXPIRED_REPLY;
use lease_insight::services::AccessRequestNotifier;
use lease_insight::AppState;

use crate::support::*;

const BOUNDARY: &str = "lease-insight-test-boundary";

fn router(provider: Option<Arc<ScriptedProvider>>) -> Router {
    create_router(AppState {
        engine: engine(provider),
        notifier: Arc::new(AccessRequestNotifier::new(reqwest::Client::new(), None)),
        cors_origins: Arc::new(vec!["http://localhost:3000".to_string()]),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn multipart(fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Request::post("/api/analyze/start")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

const START_FIELDS: [(&str, &str); 5] = [
    ("analyze_as", "tenant"),
    ("property_name", "Acme Plaza"),
    ("address", "100 Main St"),
    ("leasable_area", "2,400"),
    ("current_base_rent", "50"),
];

#[tokio::test]
async fn test_health() {
    let app = router(None);
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_unknown_session_is_404_with_detail() {
    let app = router(None);
    for uri in [
        "/api/analyze/dashboard?session_id=missing",
        "/api/custom-cards?session_id=missing",
    ] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "detail": "Session not found" }));
    }
}

#[tokio::test]
async fn test_chat_on_expired_session_replies_politely() {
    let app = router(None);
    let (status, body) = post_json(
        &app,
        "/api/analyze/chat",
        json!({ "session_id": "missing", "message": "What is fair rent?" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], SESSION_EXPIRED_REPLY);
}

#[tokio::test]
async fn test_start_then_stream_analysis() {
    let app = router(None);
    let (status, _, body) = send(&app, multipart(&START_FIELDS)).await;
    assert_eq!(status, StatusCode::OK);
    let started: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(started["ok"], true);
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let request = Request::get(format!("/api/analyze/stream?session_id={session_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/x-ndjson");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");

    let lines: Vec<Value> = String::from_utf8(body)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.first().unwrap()["type"], "progress");
    assert_eq!(lines.last().unwrap()["type"], "done");
    let dashboard = &lines[lines.len() - 2];
    assert_eq!(dashboard["type"], "dashboard");
    assert_eq!(dashboard["data"]["property"]["name"], "Acme Plaza");

    let (status, view) = get_json(&app, &format!("/api/analyze/dashboard?session_id={session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["cards"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn test_start_requires_every_field() {
    let app = router(None);
    let (status, _, body) = send(&app, multipart(&START_FIELDS[..4])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["detail"], "current_base_rent is required");
}

#[tokio::test]
async fn test_stream_for_unknown_session_is_single_error_line() {
    let app = router(None);
    let request = Request::get("/api/analyze/stream?session_id=missing")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "{\"type\":\"error\",\"message\":\"Session not found\"}\n"
    );
}

#[tokio::test]
async fn test_login_validation_and_unconfigured_directory() {
    let app = router(None);
    let (status, _) = post_json(&app, "/api/login", json!({ "username": "dana" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        "/api/login",
        json!({ "username": "dana", "password": "secret" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_access_request_without_webhook() {
    let app = router(None);
    let (status, _) = post_json(&app, "/api/access-request", json!({ "full_name": "Dana Lee" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        &app,
        "/api/access-request",
        json!({
            "full_name": "Dana Lee",
            "company_name": "Lee Retail",
            "email": "dana@example.com"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "notified": false }));
}

#[tokio::test]
async fn test_card_routes_reject_unknown_source() {
    let app = router(None);
    let (status, body) = post_json(
        &app,
        "/api/custom-cards/0/edit/stream",
        json!({ "session_id": "missing", "prompt": "shorter", "source": "archive" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("source"));
}

#[tokio::test]
async fn test_blank_custom_card_prompt_is_rejected() {
    let app = router(None);
    let (status, _) = post_json(
        &app,
        "/api/custom-cards/stream",
        json!({ "session_id": "missing", "prompt": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_card_round_trip_over_http() {
    let provider = ScriptedProvider::new(|call| {
        if call.is_edit() {
            cards_reply(vec![card_json("Parking (revised)")])
        } else {
            cards_reply(vec![card_json("Parking")])
        }
    });
    let app = router(Some(provider));
    let (_, _, body) = send(&app, multipart(&START_FIELDS)).await;
    let started: Value = serde_json::from_slice(&body).unwrap();
    let session_id = started["session_id"].as_str().unwrap();

    let request = Request::post("/api/custom-cards/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "session_id": session_id, "prompt": "Parking" }).to_string()))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let last: Value = serde_json::from_str(String::from_utf8(body).unwrap().lines().last().unwrap()).unwrap();
    assert_eq!(last["type"], "done");
    assert_eq!(last["index"], 0);

    let (status, body) = post_json(
        &app,
        "/api/custom-cards/0/confirm",
        json!({
            "session_id": session_id,
            "source": "custom",
            "updated_card": { "title": "Parking (revised)", "impact": "neutral",
                "confidence_score": 60, "source": "Site survey",
                "data_evidence": "No data", "why_it_matters": "Affects footfall." }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["index"], 0);

    let (_, cards) = get_json(&app, &format!("/api/custom-cards?session_id={session_id}")).await;
    assert_eq!(cards["cards"][0]["title"], "Parking (revised)");
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let app = router(None);
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/login")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app, request).await;
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}
