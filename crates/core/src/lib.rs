//! Lease Insight Core
//!
//! Shared domain models, error types, and stream events for the Lease Insight
//! workspace. This crate has no dependencies on application-level code
//! (HTTP server, session store, LLM providers, etc.).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `card` - Validated insight card (`InsightCard`, `Impact`)
//! - `dashboard` - Aggregated recommendation record and property descriptor
//! - `streaming` - NDJSON analysis stream events (`AnalysisEvent`)
//!
//! Depends only on serde, serde_json and thiserror, and on nothing else in the workspace.

pub mod card;
pub mod dashboard;
pub mod error;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Domain Models ──────────────────────────────────────────────────────
pub use card::{Impact, InsightCard};
pub use dashboard::{
    pct_delta, round2, DashboardPayload, DashboardSummary, PortfolioContext, PropertyDescriptor,
    Recommendations, RecommendationsSource,
};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AnalysisEvent, CardCollection, DoneResult};
