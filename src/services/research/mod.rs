//! Lease research: topic batches, card normalization, dashboard derivation,
//! single-card generation, chat and document summaries.

pub mod cards;
pub mod chat;
pub mod normalizer;
pub mod orchestrator;
pub mod prompts;
pub mod summary;
pub mod topics;

pub use cards::{create_custom_card, propose_card_edit};
pub use chat::answer_chat;
pub use normalizer::{CardNormalizer, RawCard};
pub use orchestrator::{AnalysisOutcome, BatchOrchestrator};
pub use summary::{summarize, DocumentSummary};

use lease_insight_core::AnalysisEvent;
use tokio::sync::mpsc;

/// Send an event to a stream consumer. A closed stream is not an error:
/// the client went away and the work finishes regardless.
pub(crate) async fn send_event(tx: &mpsc::Sender<AnalysisEvent>, event: AnalysisEvent) {
    if tx.send(event).await.is_err() {
        tracing::debug!("[research] event receiver closed");
    }
}
