//! Entitlement Service
//!
//! Who may use the service and how many credits they have left. The
//! directory lives in a Supabase table reached over its REST interface.
//!
//! Credit decrements are read-then-write with no lock; two concurrent
//! operations for one user may both be charged against the same balance.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::SupabaseConfig;
use crate::utils::error::{AppError, AppResult};

pub const LOGIN_DENIED: &str = "You don't have access yet. Please request access before logging in.";
pub const LOGIN_UNAVAILABLE: &str =
    "Login is temporarily unavailable; please contact the team to configure access.";
pub const CREDITS_UNAVAILABLE: &str = "Credits are temporarily unavailable; please contact the team.";
pub const USER_NOT_ALLOWED: &str = "User does not have access.";

pub const ANALYSIS_COST: i64 = 2;
pub const CARD_COST: i64 = 1;

pub const ANALYSIS_CREDITS_EXHAUSTED: &str =
    "Your credits are exhausted. Please contact the team for more credits.";
pub const CUSTOM_CARD_CREDITS_EXHAUSTED: &str =
    "Insufficient credits. You need at least 1 credit to create a custom card.";
pub const EDIT_CREDITS_EXHAUSTED: &str =
    "Insufficient credits. You need at least 1 credit to edit a card.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    #[error("entitlement service is not configured")]
    NotConfigured,

    #[error("entitlement service unavailable: {0}")]
    Unavailable(String),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;

/// User directory with a per-user credit balance.
///
/// A balance of `None` means the user has no row or no credit column value.
#[async_trait]
pub trait EntitlementService: Send + Sync {
    async fn is_allowed(&self, username: &str) -> EntitlementResult<bool>;

    async fn get_balance(&self, username: &str) -> EntitlementResult<Option<i64>>;

    /// Subtract `amount` and return the new balance. A balance that would go
    /// negative is left unchanged and returned as is.
    async fn decrement(&self, username: &str, amount: i64) -> EntitlementResult<Option<i64>>;
}

/// Used when no directory is configured.
pub struct NoEntitlements;

#[async_trait]
impl EntitlementService for NoEntitlements {
    async fn is_allowed(&self, _username: &str) -> EntitlementResult<bool> {
        Err(EntitlementError::NotConfigured)
    }

    async fn get_balance(&self, _username: &str) -> EntitlementResult<Option<i64>> {
        Err(EntitlementError::NotConfigured)
    }

    async fn decrement(&self, _username: &str, _amount: i64) -> EntitlementResult<Option<i64>> {
        Err(EntitlementError::NotConfigured)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct UserRow {
    id: Value,
    #[serde(default)]
    credits: Option<i64>,
}

/// Supabase REST directory.
pub struct SupabaseEntitlements {
    client: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseEntitlements {
    pub fn new(client: reqwest::Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.table)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
            .header("Accept", "application/json")
    }

    async fn fetch_row(&self, username: &str) -> EntitlementResult<Option<UserRow>> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(None);
        }

        let filter = format!("eq.{}", username);
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "id,username,credits"),
                ("username", filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| unavailable(username, e))?;

        if !response.status().is_success() {
            return Err(unavailable(
                username,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }

        let rows: Vec<UserRow> = response.json().await.map_err(|e| unavailable(username, e))?;
        Ok(rows.into_iter().next())
    }
}

fn unavailable(username: &str, cause: impl std::fmt::Display) -> EntitlementError {
    tracing::error!("[entitlement] directory lookup for {} failed: {}", username, cause);
    EntitlementError::Unavailable(cause.to_string())
}

#[async_trait]
impl EntitlementService for SupabaseEntitlements {
    async fn is_allowed(&self, username: &str) -> EntitlementResult<bool> {
        Ok(self.fetch_row(username).await?.is_some())
    }

    async fn get_balance(&self, username: &str) -> EntitlementResult<Option<i64>> {
        Ok(self.fetch_row(username).await?.and_then(|row| row.credits))
    }

    async fn decrement(&self, username: &str, amount: i64) -> EntitlementResult<Option<i64>> {
        let Some(row) = self.fetch_row(username).await? else {
            return Ok(None);
        };
        let Some(current) = row.credits else {
            return Ok(None);
        };

        let next = current - amount;
        if next < 0 {
            tracing::warn!(
                "[entitlement] {} has {} credits, cannot charge {}",
                username,
                current,
                amount
            );
            return Ok(Some(current));
        }

        let id_filter = match &row.id {
            Value::String(s) => format!("eq.{}", s),
            other => format!("eq.{}", other),
        };
        let response = self
            .authorized(self.client.patch(self.table_url()))
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=representation")
            .json(&json!({ "credits": next }))
            .send()
            .await
            .map_err(|e| unavailable(username, e))?;

        if !response.status().is_success() {
            return Err(unavailable(
                username,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }

        let updated = response
            .json::<Vec<UserRow>>()
            .await
            .ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.credits)
            .unwrap_or(next);
        Ok(Some(updated))
    }
}

/// Check and charge `cost` credits before a gated operation.
///
/// An unconfigured directory allows everything, an unknown balance is
/// allowed without charge, and a directory that cannot be read denies.
pub async fn charge_credits(
    service: &dyn EntitlementService,
    username: &str,
    cost: i64,
    exhausted_message: &str,
) -> AppResult<()> {
    let balance = match service.get_balance(username).await {
        Ok(balance) => balance,
        Err(EntitlementError::NotConfigured) => {
            tracing::warn!("[entitlement] directory not configured; skipping credit check for {}", username);
            return Ok(());
        }
        Err(EntitlementError::Unavailable(_)) => {
            return Err(AppError::service_unavailable(CREDITS_UNAVAILABLE));
        }
    };

    let Some(balance) = balance else {
        return Ok(());
    };
    if balance < cost {
        return Err(AppError::insufficient_credits(exhausted_message));
    }

    match service.decrement(username, cost).await {
        Ok(remaining) => {
            tracing::info!("[entitlement] charged {} credits to {} (remaining={:?})", cost, username, remaining);
            Ok(())
        }
        Err(e) => {
            // The balance was sufficient; a failed write is not the user's problem.
            tracing::warn!("[entitlement] charging {} failed: {}", username, e);
            Ok(())
        }
    }
}

/// Allow-list check for login and session start.
pub async fn require_allowed(service: &dyn EntitlementService, username: &str) -> AppResult<()> {
    match service.is_allowed(username).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::forbidden(LOGIN_DENIED)),
        Err(_) => Err(AppError::service_unavailable(LOGIN_UNAVAILABLE)),
    }
}

/// Current balance for a user known to the directory.
pub async fn credits_for(
    service: &dyn EntitlementService,
    username: &str,
) -> AppResult<Option<i64>> {
    match service.is_allowed(username).await {
        Ok(true) => {}
        Ok(false) => return Err(AppError::forbidden(USER_NOT_ALLOWED)),
        Err(_) => return Err(AppError::service_unavailable(CREDITS_UNAVAILABLE)),
    }
    service
        .get_balance(username)
        .await
        .map_err(|_| AppError::service_unavailable(CREDITS_UNAVAILABLE))
}
