//! Data Models
//!
//! Contains the data structures persisted by the application.

pub mod session;

pub use session::*;
