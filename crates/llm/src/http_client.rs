//! HTTP Client Factory
//!
//! One place to build the `reqwest::Client` shared by the providers and the
//! search client.

use std::time::Duration;

/// Upper bound for a single provider or search request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build a `reqwest::Client` with the workspace defaults.
///
/// Falls back to the default client if the builder rejects the settings.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("[http_client] builder failed ({}), using defaults", e);
            reqwest::Client::new()
        })
}
