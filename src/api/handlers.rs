//! API request handlers

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use lease_insight_core::{AnalysisEvent, CardCollection, InsightCard};

use crate::services::entitlement::{credits_for, require_allowed};
use crate::services::{AccessRequest, StartRequest};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomCardRequest {
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct CardEditRequest {
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct CardConfirmRequest {
    pub session_id: String,
    #[serde(default)]
    pub source: String,
    pub updated_card: InsightCard,
}

fn collection(source: &str) -> AppResult<CardCollection> {
    Ok(CardCollection::parse(source)?)
}

/// Stream events as newline-delimited JSON.
fn ndjson(rx: mpsc::Receiver<AnalysisEvent>) -> Response {
    let lines = ReceiverStream::new(rx).map(|event| event.to_ndjson_line());
    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Form fields and uploaded files of a multipart request.
#[derive(Debug, Default)]
struct FormData {
    fields: std::collections::HashMap<String, String>,
    files: Vec<(String, Vec<u8>)>,
}

impl FormData {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(format!("invalid form data: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(filename) = field.file_name().map(str::to_string) {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("invalid upload: {}", e)))?;
                if !filename.is_empty() {
                    tracing::debug!("[api] received file {:?}: {} bytes", filename, bytes.len());
                    form.files.push((filename, bytes.to_vec()));
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("invalid form field: {}", e)))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::validation(format!("{} is required", name)))
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Extract and summarise uploaded documents without opening a session.
pub async fn analyze_documents(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let form = FormData::read(multipart).await?;
    let analyze_as = form.optional("analyze_as").unwrap_or_default();
    let property_name = form.optional("property_name").unwrap_or_default();
    tracing::info!(
        "[api] analyze: role={} property={:?} files={}",
        analyze_as,
        property_name,
        form.files.len()
    );

    let analysis = state.engine.analyze_documents(form.files).await?;
    Ok(Json(json!({
        "ok": true,
        "message": "Payload received",
        "received": {
            "analyze_as": analyze_as,
            "property_name": property_name,
            "file_count": analysis.file_names.len(),
            "extracted_file_count": analysis.extracted_texts.len(),
            "summary_used": analysis.summary.is_some(),
        },
        "summary": analysis.summary,
    })))
}

pub async fn start_analysis(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let form = FormData::read(multipart).await?;
    let request = StartRequest {
        analyze_as: form.required("analyze_as")?,
        property_name: form.required("property_name")?,
        address: form.required("address")?,
        leasable_area: form.required("leasable_area")?,
        current_base_rent: form.required("current_base_rent")?,
        document_text: form.optional("document_text"),
        llm_provider: form.optional("llm_provider"),
        username: form.optional("username"),
        files: form.files,
    };
    let session_id = state.engine.start_session(request).await?;
    Ok(Json(json!({ "ok": true, "session_id": session_id })))
}

pub async fn stream_analysis(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    ndjson(state.engine.stream_analysis(&query.session_id))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.engine.dashboard(&query.session_id)?))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<Value>> {
    let reply = state
        .engine
        .chat(&body.session_id, &body.message, body.llm_provider.as_deref())
        .await?;
    Ok(Json(json!({ "reply": reply })))
}

/// Allow-list gate. Passwords are required but not verified.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let username = body.username.trim();
    if username.is_empty() || body.password.trim().is_empty() {
        return Err(AppError::validation("username and password are required"));
    }
    require_allowed(state.engine.entitlements().as_ref(), username).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn user_credits(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Value>> {
    let username = query.username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username is required"));
    }
    let credits = credits_for(state.engine.entitlements().as_ref(), username).await?;
    Ok(Json(json!({ "username": username, "credits": credits })))
}

pub async fn access_request(
    State(state): State<AppState>,
    Json(body): Json<AccessRequest>,
) -> AppResult<Json<Value>> {
    if body.full_name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(AppError::validation("full_name and email are required"));
    }
    let notified = state.notifier.notify_access_request(&body).await;
    Ok(Json(json!({ "ok": true, "notified": notified })))
}

pub async fn custom_cards(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> AppResult<Json<Value>> {
    let cards = state.engine.custom_cards(&query.session_id)?;
    Ok(Json(json!({ "cards": cards })))
}

pub async fn stream_custom_card(
    State(state): State<AppState>,
    Json(body): Json<CustomCardRequest>,
) -> AppResult<Response> {
    let rx = state
        .engine
        .stream_custom_card(&body.session_id, &body.prompt)
        .await?;
    Ok(ndjson(rx))
}

pub async fn stream_card_edit(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(body): Json<CardEditRequest>,
) -> AppResult<Response> {
    let source = collection(&body.source)?;
    let rx = state
        .engine
        .stream_card_edit(&body.session_id, index, &body.prompt, source)?;
    Ok(ndjson(rx))
}

pub async fn confirm_card_edit(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(body): Json<CardConfirmRequest>,
) -> AppResult<Json<Value>> {
    let source = collection(&body.source)?;
    let card = state
        .engine
        .confirm_card_edit(&body.session_id, index, source, body.updated_card)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "index": index,
        "source": source,
        "updated_card": card,
    })))
}
