//! Session Models
//!
//! Typed view of the record kept in the session store for one analysis.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use lease_insight_core::{
    CardCollection, DashboardSummary, InsightCard, PropertyDescriptor,
};
use lease_insight_llm::ProviderType;

use crate::utils::error::{AppError, AppResult};

/// Raw session record as stored: a JSON object keyed by field name.
pub type SessionData = Map<String, Value>;

/// Who the analysis is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tenant,
    Landlord,
    Broker,
}

impl Role {
    /// Case-insensitive parse; unknown names are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "tenant" => Some(Self::Tenant),
            "landlord" => Some(Self::Landlord),
            "broker" => Some(Self::Broker),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Landlord => "landlord",
            Self::Broker => "broker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis session.
///
/// The request fields (role, property, document context, username) are
/// written once at creation. Only the fields that [`SessionPatch`] can carry
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub analyze_as: Role,
    pub property_name: String,
    pub address: String,
    pub leasable_area: String,
    pub current_base_rent: String,
    #[serde(default)]
    pub document_context: Option<String>,
    #[serde(default)]
    pub llm_provider: ProviderType,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub cards: Vec<InsightCard>,
    #[serde(default)]
    pub custom_cards: Vec<InsightCard>,
    #[serde(default)]
    pub dashboard_summary: Option<DashboardSummary>,
}

impl SessionRecord {
    pub fn property(&self) -> PropertyDescriptor {
        PropertyDescriptor {
            name: self.property_name.clone(),
            address: self.address.clone(),
            leasable_area: self.leasable_area.clone(),
            current_base_rent: self.current_base_rent.clone(),
        }
    }

    /// Cards of one collection.
    pub fn collection(&self, collection: CardCollection) -> &[InsightCard] {
        match collection {
            CardCollection::Validation => &self.cards,
            CardCollection::Custom => &self.custom_cards,
        }
    }

    /// Document context, if any non-blank text was supplied.
    pub fn document(&self) -> Option<&str> {
        self.document_context
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }

    pub fn to_data(&self) -> AppResult<SessionData> {
        to_object(self)
    }

    pub fn from_data(data: SessionData) -> AppResult<Self> {
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Partial update of the mutable session fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<InsightCard>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_cards: Option<Vec<InsightCard>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_summary: Option<DashboardSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<ProviderType>,
}

impl SessionPatch {
    /// Replace one card collection.
    pub fn collection(collection: CardCollection, cards: Vec<InsightCard>) -> Self {
        match collection {
            CardCollection::Validation => Self {
                cards: Some(cards),
                ..Default::default()
            },
            CardCollection::Custom => Self {
                custom_cards: Some(cards),
                ..Default::default()
            },
        }
    }

    pub fn provider(provider: ProviderType) -> Self {
        Self {
            llm_provider: Some(provider),
            ..Default::default()
        }
    }

    pub fn to_data(&self) -> AppResult<SessionData> {
        to_object(self)
    }
}

fn to_object<T: Serialize>(value: &T) -> AppResult<SessionData> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::internal(format!(
            "session value is not an object: {}",
            other
        ))),
    }
}
