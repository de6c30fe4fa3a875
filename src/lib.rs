//! Lease Insight - Rust Backend Library
//!
//! Streaming lease research: role-aware insight cards, a rent dashboard and
//! chat for one property, produced by interchangeable LLM providers.
//! It includes:
//! - HTTP API handlers (axum)
//! - Session engine and research services
//! - SQLite session store
//! - Configuration, data models and utilities

pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use config::AppConfig;
pub use models::session::{Role, SessionPatch, SessionRecord};
pub use services::{SessionEngine, StartRequest};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
