//! Streaming Session Engine
//!
//! The session-level operations behind the API. Long-running flows (full
//! analysis, custom card, card edit) run on spawned tasks and report through
//! a bounded channel of [`AnalysisEvent`]s. Every stream ends with exactly
//! one `done` or `error` event.
//!
//! A receiver that goes away stops event delivery only; the provider work
//! still finishes and its result is still stored.
//!
//! Session updates are whole-field read-then-write. Two concurrent streams
//! against one session may overwrite each other's card lists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use lease_insight_core::{
    AnalysisEvent, CardCollection, DashboardPayload, DashboardSummary, DoneResult, InsightCard,
    PropertyDescriptor,
};
use lease_insight_llm::{ProviderAdapter, ProviderType};

use super::entitlement::{
    charge_credits, EntitlementError, EntitlementService, ANALYSIS_COST,
    ANALYSIS_CREDITS_EXHAUSTED, CARD_COST, CREDITS_UNAVAILABLE, CUSTOM_CARD_CREDITS_EXHAUSTED,
    EDIT_CREDITS_EXHAUSTED, LOGIN_DENIED,
};
use super::extraction::{document_context, extract_text};
use super::research::chat::SESSION_EXPIRED_REPLY;
use super::research::{
    answer_chat, create_custom_card, propose_card_edit, send_event, summarize, BatchOrchestrator,
    DocumentSummary,
};
use crate::models::session::{Role, SessionPatch, SessionRecord};
use crate::storage::{short_id, SessionStore, SessionStoreExt};
use crate::utils::error::{AppError, AppResult};

pub const SESSION_NOT_FOUND: &str = "Session not found";
pub const CARD_NOT_FOUND: &str = "Card not found";
pub const CUSTOM_CARD_FAILED: &str = "Failed to create custom card";
pub const EDIT_FAILED: &str = "Failed to update card";

/// Interval between progress messages while a single-card call is pending.
pub const PROGRESS_TICK: Duration = Duration::from_secs(3);

const EVENT_BUFFER: usize = 64;

pub const CUSTOM_CARD_STEPS: [&str; 9] = [
    "Reviewing lease context and property details…",
    "Searching for comparable market data…",
    "Querying recent transaction comps…",
    "Analyzing vacancy and demand trends…",
    "Cross-referencing benchmark figures…",
    "Evaluating negotiation leverage signals…",
    "Structuring insight card fields…",
    "Validating data evidence…",
    "Finalising card content…",
];

pub const EDIT_STEPS: [&str; 9] = [
    "Reading original card context…",
    "Analysing your refinement request…",
    "Searching for supporting market data…",
    "Cross-referencing lease benchmarks…",
    "Drafting updated insight…",
    "Revising data evidence…",
    "Updating negotiation context…",
    "Recalculating confidence score…",
    "Finalising revised card…",
];

/// Everything needed to open a session.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub analyze_as: String,
    pub property_name: String,
    pub address: String,
    pub leasable_area: String,
    pub current_base_rent: String,
    pub document_text: Option<String>,
    /// Uploaded files as (filename, bytes)
    pub files: Vec<(String, Vec<u8>)>,
    pub llm_provider: Option<String>,
    pub username: Option<String>,
}

/// Dashboard view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub property: PropertyDescriptor,
    pub dashboard_summary: Option<DashboardSummary>,
    pub cards: Vec<InsightCard>,
}

/// Extraction and summary of uploaded documents, without a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    pub file_names: Vec<String>,
    pub extracted_texts: BTreeMap<String, String>,
    pub summary: Option<DocumentSummary>,
}

#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    adapter: Arc<ProviderAdapter>,
    orchestrator: Arc<BatchOrchestrator>,
    entitlements: Arc<dyn EntitlementService>,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        adapter: Arc<ProviderAdapter>,
        entitlements: Arc<dyn EntitlementService>,
    ) -> Self {
        let orchestrator = Arc::new(BatchOrchestrator::new(adapter.clone()));
        Self {
            store,
            adapter,
            orchestrator,
            entitlements,
        }
    }

    pub fn adapter(&self) -> &Arc<ProviderAdapter> {
        &self.adapter
    }

    pub fn entitlements(&self) -> &Arc<dyn EntitlementService> {
        &self.entitlements
    }

    /// Validate the request, charge the user, resolve the document context
    /// and store a fresh session. Returns the new session id.
    pub async fn start_session(&self, request: StartRequest) -> AppResult<String> {
        let role = Role::parse(&request.analyze_as).ok_or_else(|| {
            AppError::validation("analyze_as must be 'tenant', 'landlord' or 'broker'")
        })?;
        let provider = ProviderType::normalize(request.llm_provider.as_deref().unwrap_or("openai"));
        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        if let Some(user) = &username {
            self.gate_analysis(user).await?;
        }

        let pasted = request.document_text;
        let files = request.files;
        let document = tokio::task::spawn_blocking(move || document_context(pasted.as_deref(), &files))
            .await
            .map_err(|e| AppError::internal(format!("document extraction panicked: {}", e)))?;

        let record = SessionRecord {
            analyze_as: role,
            property_name: request.property_name,
            address: request.address,
            leasable_area: request.leasable_area,
            current_base_rent: request.current_base_rent,
            document_context: document,
            llm_provider: provider,
            username,
            cards: Vec::new(),
            custom_cards: Vec::new(),
            dashboard_summary: None,
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        {
            let (id, record) = (session_id.clone(), record.clone());
            self.on_store(move |store| store.save_record(&id, &record)).await?;
        }
        tracing::info!(
            "[engine] started session {} role={} property={:?} provider={} document_chars={}",
            short_id(&session_id),
            role,
            record.property_name,
            provider,
            record.document().map(|d| d.chars().count()).unwrap_or(0)
        );
        Ok(session_id)
    }

    /// Allow-list plus credit check for a new analysis. An unconfigured
    /// directory lets everyone through.
    async fn gate_analysis(&self, username: &str) -> AppResult<()> {
        match self.entitlements.is_allowed(username).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::forbidden(LOGIN_DENIED)),
            Err(EntitlementError::NotConfigured) => {
                tracing::warn!("[engine] entitlement directory not configured; skipping checks");
                return Ok(());
            }
            Err(EntitlementError::Unavailable(_)) => {
                return Err(AppError::service_unavailable(CREDITS_UNAVAILABLE));
            }
        }
        charge_credits(
            self.entitlements.as_ref(),
            username,
            ANALYSIS_COST,
            ANALYSIS_CREDITS_EXHAUSTED,
        )
        .await
    }

    async fn charge(&self, record: &SessionRecord, cost: i64, exhausted: &str) -> AppResult<()> {
        match record.username.as_deref() {
            Some(user) => charge_credits(self.entitlements.as_ref(), user, cost, exhausted).await,
            None => Ok(()),
        }
    }

    fn load(&self, session_id: &str) -> AppResult<SessionRecord> {
        self.store
            .load_record(session_id)?
            .ok_or_else(|| AppError::not_found(SESSION_NOT_FOUND))
    }

    /// Run a store operation on the blocking pool.
    async fn on_store<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn SessionStore) -> AppResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| AppError::internal(format!("session store task failed: {}", e)))?
    }

    async fn fetch(&self, session_id: &str) -> AppResult<Option<SessionRecord>> {
        let id = session_id.to_string();
        self.on_store(move |store| store.load_record(&id)).await
    }

    async fn fetch_existing(&self, session_id: &str) -> AppResult<SessionRecord> {
        self.fetch(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(SESSION_NOT_FOUND))
    }

    async fn patch(&self, session_id: &str, patch: SessionPatch) -> AppResult<Option<SessionRecord>> {
        let id = session_id.to_string();
        self.on_store(move |store| store.apply_patch(&id, &patch)).await
    }

    /// Full analysis: per-topic progress, per-batch cards, dashboard, done.
    pub fn stream_analysis(&self, session_id: &str) -> mpsc::Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let event = engine.run_analysis(&session_id, &tx).await;
            send_event(&tx, event).await;
        });
        rx
    }

    /// Runs the analysis and returns the terminal event.
    async fn run_analysis(&self, session_id: &str, tx: &mpsc::Sender<AnalysisEvent>) -> AnalysisEvent {
        let record = match self.fetch_existing(session_id).await {
            Ok(record) => record,
            Err(e) => return AnalysisEvent::error(e.detail()),
        };

        let outcome = self.orchestrator.analyze(&record, tx).await;
        let patch = SessionPatch {
            cards: Some(outcome.cards.clone()),
            dashboard_summary: Some(outcome.dashboard.clone()),
            ..Default::default()
        };
        match self.patch(session_id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => return AnalysisEvent::error(SESSION_NOT_FOUND),
            Err(e) => {
                tracing::error!("[engine] storing analysis for {} failed: {}", short_id(session_id), e);
                return AnalysisEvent::error(e.detail());
            }
        }
        tracing::info!(
            "[engine] analysis for {} stored: {} cards",
            short_id(session_id),
            outcome.cards.len()
        );

        send_event(
            tx,
            AnalysisEvent::Dashboard {
                data: DashboardPayload {
                    summary: outcome.dashboard,
                    property: record.property(),
                },
            },
        )
        .await;
        AnalysisEvent::done()
    }

    /// New custom card on `prompt`. Validation and credit errors are
    /// returned before any stream is opened.
    pub async fn stream_custom_card(
        &self,
        session_id: &str,
        prompt: &str,
    ) -> AppResult<mpsc::Receiver<AnalysisEvent>> {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(AppError::validation("prompt is required"));
        }
        let record = match self.fetch(session_id).await? {
            Some(record) => record,
            None => return Ok(single_event(AnalysisEvent::error(SESSION_NOT_FOUND))),
        };
        self.charge(&record, CARD_COST, CUSTOM_CARD_CREDITS_EXHAUSTED).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let adapter = engine.adapter.clone();
            let work = {
                let record = record.clone();
                tokio::spawn(async move { create_custom_card(&adapter, &record, &prompt).await })
            };
            let event = match with_progress(&tx, &CUSTOM_CARD_STEPS, work).await {
                Ok(Ok(card)) => engine.append_custom_card(&session_id, card).await,
                Ok(Err(e)) => {
                    tracing::warn!("[engine] custom card for {} failed: {}", short_id(&session_id), e);
                    AnalysisEvent::error(CUSTOM_CARD_FAILED)
                }
                Err(e) => {
                    tracing::error!("[engine] custom card task aborted: {}", e);
                    AnalysisEvent::error(CUSTOM_CARD_FAILED)
                }
            };
            send_event(&tx, event).await;
        });
        Ok(rx)
    }

    async fn append_custom_card(&self, session_id: &str, card: InsightCard) -> AnalysisEvent {
        let mut record = match self.fetch_existing(session_id).await {
            Ok(record) => record,
            Err(e) => return AnalysisEvent::error(e.detail()),
        };
        let index = record.custom_cards.len();
        record.custom_cards.push(card.clone());

        let patch = SessionPatch::collection(CardCollection::Custom, record.custom_cards);
        match self.patch(session_id, patch).await {
            Ok(Some(_)) => AnalysisEvent::Done(DoneResult {
                card: Some(card),
                index: Some(index),
                ..Default::default()
            }),
            Ok(None) => AnalysisEvent::error(SESSION_NOT_FOUND),
            Err(e) => {
                tracing::error!("[engine] storing custom card failed: {}", e);
                AnalysisEvent::error(CUSTOM_CARD_FAILED)
            }
        }
    }

    /// Propose an edit of the card at `index`. The session is not changed;
    /// see [`SessionEngine::confirm_card_edit`].
    pub fn stream_card_edit(
        &self,
        session_id: &str,
        index: usize,
        prompt: &str,
        collection: CardCollection,
    ) -> AppResult<mpsc::Receiver<AnalysisEvent>> {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(AppError::validation("prompt is required"));
        }
        let record = match self.store.load_record(session_id)? {
            Some(record) => record,
            None => return Ok(single_event(AnalysisEvent::error(SESSION_NOT_FOUND))),
        };
        let Some(original) = record.collection(collection).get(index).cloned() else {
            return Ok(single_event(AnalysisEvent::error(CARD_NOT_FOUND)));
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            let work = {
                let original = original.clone();
                tokio::spawn(async move {
                    propose_card_edit(&adapter, &record, &original, &prompt).await
                })
            };
            let event = match with_progress(&tx, &EDIT_STEPS, work).await {
                Ok(Ok(updated)) => AnalysisEvent::Done(DoneResult {
                    original: Some(original),
                    updated: Some(updated),
                    index: Some(index),
                    source: Some(collection),
                    ..Default::default()
                }),
                Ok(Err(e)) => {
                    tracing::warn!("[engine] card edit failed: {}", e);
                    AnalysisEvent::error(EDIT_FAILED)
                }
                Err(e) => {
                    tracing::error!("[engine] card edit task aborted: {}", e);
                    AnalysisEvent::error(EDIT_FAILED)
                }
            };
            send_event(&tx, event).await;
        });
        Ok(rx)
    }

    /// Store a caller-approved card at `index`. Charged per call.
    pub async fn confirm_card_edit(
        &self,
        session_id: &str,
        index: usize,
        collection: CardCollection,
        card: InsightCard,
    ) -> AppResult<InsightCard> {
        let record = self.fetch_existing(session_id).await?;
        let mut cards = record.collection(collection).to_vec();
        if index >= cards.len() {
            return Err(AppError::not_found(CARD_NOT_FOUND));
        }
        self.charge(&record, CARD_COST, EDIT_CREDITS_EXHAUSTED).await?;

        cards[index] = card.clone();
        self.patch(session_id, SessionPatch::collection(collection, cards))
            .await?
            .ok_or_else(|| AppError::not_found(SESSION_NOT_FOUND))?;
        tracing::info!(
            "[engine] confirmed {:?} card {} for {}",
            collection,
            index,
            short_id(session_id)
        );
        Ok(card)
    }

    /// Answer a chat message. A missing session gets a friendly reply.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        provider: Option<&str>,
    ) -> AppResult<String> {
        let Some(mut record) = self.fetch(session_id).await? else {
            return Ok(SESSION_EXPIRED_REPLY.to_string());
        };
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::validation("message is required"));
        }

        if let Some(name) = provider.map(str::trim).filter(|p| !p.is_empty()) {
            let provider = ProviderType::normalize(name);
            if provider != record.llm_provider {
                self.patch(session_id, SessionPatch::provider(provider)).await?;
                record.llm_provider = provider;
            }
        }

        Ok(answer_chat(&self.adapter, &record, message).await)
    }

    pub fn dashboard(&self, session_id: &str) -> AppResult<DashboardView> {
        let record = self.load(session_id)?;
        Ok(DashboardView {
            property: record.property(),
            dashboard_summary: record.dashboard_summary,
            cards: record.cards,
        })
    }

    pub fn custom_cards(&self, session_id: &str) -> AppResult<Vec<InsightCard>> {
        Ok(self.load(session_id)?.custom_cards)
    }

    /// Extract every file and summarise the combined text.
    pub async fn analyze_documents(&self, files: Vec<(String, Vec<u8>)>) -> AppResult<DocumentAnalysis> {
        let files: Vec<_> = files.into_iter().filter(|(name, _)| !name.is_empty()).collect();
        if files.is_empty() {
            return Ok(DocumentAnalysis::default());
        }

        let extracted = tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(|(name, bytes)| {
                    let text = extract_text(&bytes, &name);
                    tracing::debug!("[engine] extracted {} chars from {:?}", text.len(), name);
                    (name, text)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| AppError::internal(format!("document extraction panicked: {}", e)))?;

        let combined = extracted
            .iter()
            .map(|(name, text)| format!("--- {} ---\n{}", name, text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = summarize(&self.adapter, &combined).await;
        if let Some(error) = &summary.error {
            tracing::warn!("[engine] document summary failed: {}", error);
        }

        Ok(DocumentAnalysis {
            file_names: extracted.iter().map(|(name, _)| name.clone()).collect(),
            extracted_texts: extracted.into_iter().collect(),
            summary: Some(summary),
        })
    }
}

/// A stream holding one already-sent event.
fn single_event(event: AnalysisEvent) -> mpsc::Receiver<AnalysisEvent> {
    let (tx, rx) = mpsc::channel(1);
    if tx.try_send(event).is_err() {
        tracing::debug!("[engine] single-event stream rejected its event");
    }
    rx
}

/// Await `work` while emitting one progress step per tick, cycling through
/// `steps`. Returns as soon as the work completes.
pub async fn with_progress<T>(
    tx: &mpsc::Sender<AnalysisEvent>,
    steps: &[&str],
    mut work: JoinHandle<T>,
) -> Result<T, JoinError>
where
    T: Send + 'static,
{
    let mut step = 0;
    loop {
        if work.is_finished() || steps.is_empty() {
            return work.await;
        }
        send_event(tx, AnalysisEvent::progress(steps[step % steps.len()])).await;
        step += 1;
        if let Ok(result) = tokio::time::timeout(PROGRESS_TICK, &mut work).await {
            return result;
        }
    }
}

/// Drain a stream into a vector; used by the CLI and tests.
pub async fn collect_events(mut rx: mpsc::Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}
