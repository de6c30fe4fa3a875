//! HTTP API
//!
//! Thin axum layer over the session engine. Errors are returned as
//! `{"detail": message}` with a status derived from the error kind; the
//! long-running flows respond with an NDJSON stream.

mod error;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
