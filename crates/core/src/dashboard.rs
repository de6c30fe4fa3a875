//! Dashboard Summary Model
//!
//! The single aggregated recommendation record derived from all cards of a
//! session, plus the property descriptor it is displayed with.

use serde::{Deserialize, Serialize};

/// Placeholder for a recommendation value the evidence does not support.
pub const NO_RECOMMENDATION: &str = "—";

/// Which generation path produced a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationsSource {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Fallback,
}

/// Ideal term, negotiation leverage, and renewal stance, each with reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub ideal_term: String,
    pub ideal_term_reasoning: String,
    pub negotiation_leverage: String,
    pub negotiation_leverage_reasoning: String,
    pub renewals: String,
    pub renewals_reasoning: String,
}

impl Recommendations {
    /// All values set to the explicit placeholder, no reasoning.
    pub fn placeholder() -> Self {
        Self {
            ideal_term: NO_RECOMMENDATION.to_string(),
            ideal_term_reasoning: String::new(),
            negotiation_leverage: NO_RECOMMENDATION.to_string(),
            negotiation_leverage_reasoning: String::new(),
            renewals: NO_RECOMMENDATION.to_string(),
            renewals_reasoning: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub this_property_rent: f64,
    pub portfolio_avg_rent: f64,
    pub comparison_pct: f64,
    pub comparison_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub fair_market_rent: f64,
    pub confidence_score: u8,
    /// Always recomputed from `fair_market_rent` and the stated current rent.
    pub vs_current_pct: f64,
    pub recommendations: Recommendations,
    pub portfolio_context: PortfolioContext,
    pub recommendations_source: RecommendationsSource,
}

impl DashboardSummary {
    /// Safe record used when there is no evidence or no usable provider output.
    pub fn fallback(current_rent: f64) -> Self {
        let current = round2(current_rent);
        Self {
            fair_market_rent: current,
            confidence_score: 0,
            vs_current_pct: 0.0,
            recommendations: Recommendations::placeholder(),
            portfolio_context: PortfolioContext {
                this_property_rent: current,
                portfolio_avg_rent: current,
                comparison_pct: 0.0,
                comparison_text: String::new(),
            },
            recommendations_source: RecommendationsSource::Fallback,
        }
    }
}

/// Percentage change of `value` relative to `base`, rounded to 2 decimals.
/// Defined as 0.0 when `base` is zero.
pub fn pct_delta(value: f64, base: f64) -> f64 {
    if base == 0.0 {
        return 0.0;
    }
    round2((value - base) / base * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Property facts as entered by the requester. Free-form display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub address: String,
    pub leasable_area: String,
    pub current_base_rent: String,
}

impl PropertyDescriptor {
    /// Current rent for arithmetic: commas removed, 42.0 when unparseable.
    pub fn current_rent(&self) -> f64 {
        self.current_base_rent
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_CURRENT_RENT)
    }
}

/// Rent assumed when the stated current rent cannot be parsed.
pub const DEFAULT_CURRENT_RENT: f64 = 42.0;

/// Dashboard summary merged with the property it describes, as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    #[serde(flatten)]
    pub summary: DashboardSummary,
    pub property: PropertyDescriptor,
}
