//! Storage Layer
//!
//! Session persistence: the store trait and its SQLite implementation.

pub mod session_store;

pub use session_store::*;
