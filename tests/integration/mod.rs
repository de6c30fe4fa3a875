//! Integration Tests Module
//!
//! End-to-end tests for Lease Insight: the full analysis stream, custom
//! cards and edits, search-grounded citations, credit gating and the HTTP
//! surface. LLM providers are scripted and remote services are mocked.

// Scripted provider, fixed search and fixtures
mod support;

// Full analysis through the session engine
mod analysis_test;

// Custom cards, edits and confirmation
mod cards_test;

// Chat replies and provider switching
mod chat_test;

// Search tool loop and citation backfill
mod search_test;


// Router, status codes and NDJSON responses
mod api_test;
