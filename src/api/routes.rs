//! API route definitions

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(handlers::health))
        // Analysis
        .route("/api/analyze", post(handlers::analyze_documents))
        .route("/api/analyze/start", post(handlers::start_analysis))
        .route("/api/analyze/stream", get(handlers::stream_analysis))
        .route("/api/analyze/dashboard", get(handlers::dashboard))
        .route("/api/analyze/chat", post(handlers::chat))
        // Access
        .route("/api/login", post(handlers::login))
        .route("/api/user/credits", get(handlers::user_credits))
        .route("/api/access-request", post(handlers::access_request))
        // Custom cards and edits
        .route("/api/custom-cards", get(handlers::custom_cards))
        .route("/api/custom-cards/stream", post(handlers::stream_custom_card))
        .route(
            "/api/custom-cards/{index}/edit/stream",
            post(handlers::stream_card_edit),
        )
        .route(
            "/api/custom-cards/{index}/confirm",
            post(handlers::confirm_card_edit),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins, with credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("[api] ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}
