//! Access-Request Notifier
//!
//! Forwards access requests to a webhook as JSON, with an optional
//! HMAC-SHA256 signature header.
//!
//! Headers sent:
//! - `Content-Type: application/json`
//! - `X-Webhook-Event: access_request`
//! - `X-Webhook-Signature: sha256=<hex HMAC of the body>` (when a secret is set)

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::WebhookConfig;

pub const ACCESS_REQUEST_EVENT: &str = "access_request";

/// Fields submitted on the request-access form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub full_name: String,
    pub company_name: String,
    pub email: String,
    #[serde(default)]
    pub use_case: String,
}

#[derive(Serialize)]
struct AccessRequestPayload<'a> {
    event: &'static str,
    timestamp: String,
    #[serde(flatten)]
    request: &'a AccessRequest,
}

pub struct AccessRequestNotifier {
    client: reqwest::Client,
    webhook: Option<WebhookConfig>,
}

impl AccessRequestNotifier {
    pub fn new(client: reqwest::Client, webhook: Option<WebhookConfig>) -> Self {
        Self { client, webhook }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook.is_some()
    }

    /// Post the request. Returns whether the webhook accepted it; never errors.
    pub async fn notify_access_request(&self, request: &AccessRequest) -> bool {
        let Some(webhook) = &self.webhook else {
            tracing::warn!("[notifier] access request from {} not forwarded: no webhook configured", request.email);
            return false;
        };

        let payload = AccessRequestPayload {
            event: ACCESS_REQUEST_EVENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request,
        };
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("[notifier] could not encode access request: {}", e);
                return false;
            }
        };

        let mut builder = self
            .client
            .post(&webhook.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Event", ACCESS_REQUEST_EVENT);

        if let Some(secret) = webhook.secret.as_deref().filter(|s| !s.is_empty()) {
            match sign(secret, &body) {
                Some(signature) => {
                    builder = builder.header("X-Webhook-Signature", format!("sha256={}", signature));
                }
                None => {
                    tracing::warn!("[notifier] could not sign access request");
                    return false;
                }
            }
        }

        match builder.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("[notifier] access request from {} forwarded", request.email);
                true
            }
            Ok(response) => {
                tracing::warn!("[notifier] webhook returned HTTP {}", response.status().as_u16());
                false
            }
            Err(e) => {
                tracing::warn!("[notifier] webhook request failed: {}", e);
                false
            }
        }
    }
}

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
pub fn sign(secret: &str, body: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body.as_bytes());
    Some(
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect(),
    )
}
