//! Card Normalizer
//!
//! Turns raw provider output into validated [`InsightCard`]s in two stages:
//!
//! 1. [`parse_raw_cards`] is permissive. It accepts anything, never fails,
//!    and yields [`RawCard`]s whose fields are all optional.
//! 2. [`CardNormalizer::normalize`] is strict. It fills defaults, clamps
//!    numbers, drops repeated titles and assigns source URLs.
//!
//! Malformed input never raises; the only failure signal is an empty list.

use std::collections::HashSet;

use serde_json::Value;

use lease_insight_core::card::{NO_DATA, SOURCE_NOT_AVAILABLE};
use lease_insight_core::{Impact, InsightCard};
use lease_insight_llm::strip_code_fence;

use crate::models::session::Role;

/// Label used when a model cites "web search" itself.
pub const GENERIC_WEB_SOURCE: &str = "Public data / Market sources";

const MAX_SOURCE_WORDS: usize = 4;

const WHY_PLACEHOLDERS: [&str; 7] = ["n/a", "na", "—", "-", "none", "no data", ""];

const EXEMPT_SOURCES: [&str; 4] = ["not available", "user document", "public data", "market sources"];

/// A card-like object with every field optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCard {
    /// 1-based position in the raw list
    pub position: usize,
    pub title: Option<String>,
    pub impact: Option<String>,
    pub confidence_score: Option<i64>,
    pub source: Option<String>,
    pub insight: Option<String>,
    pub data_evidence: Option<String>,
    pub why_it_matters: Option<String>,
    pub baseline_pct: Option<i64>,
    pub current_trend_pct: Option<i64>,
    pub source_url: Option<String>,
}

impl RawCard {
    /// Lenient read of one JSON item. Non-objects yield `None`.
    pub fn from_value(position: usize, value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| obj.get(key).and_then(lenient_string);
        let number = |key: &str| obj.get(key).and_then(lenient_int);
        Some(Self {
            position,
            title: text("title"),
            impact: text("impact"),
            confidence_score: number("confidence_score"),
            source: text("source"),
            insight: text("insight"),
            data_evidence: text("data_evidence"),
            why_it_matters: text("why_it_matters"),
            baseline_pct: number("baseline_pct"),
            current_trend_pct: number("current_trend_pct"),
            source_url: text("source_url"),
        })
    }
}

/// Stage 1: parse provider text into raw cards.
///
/// Code fences are stripped. Anything other than an object with a `cards`
/// array yields an empty list.
pub fn parse_raw_cards(text: &str) -> Vec<RawCard> {
    let cleaned = strip_code_fence(text);
    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("[normalizer] provider output is not JSON: {}", e);
            return Vec::new();
        }
    };
    let Some(items) = value.get("cards").and_then(Value::as_array) else {
        tracing::warn!("[normalizer] provider output has no cards array");
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let raw = RawCard::from_value(i + 1, item);
            if raw.is_none() {
                tracing::debug!("[normalizer] skipping non-object item {}", i + 1);
            }
            raw
        })
        .collect()
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integers, truncated floats, or numeric strings with an optional `%`.
fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_int)),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%').trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
        }
        _ => None,
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Stage 2: strict conversion for one generation pass.
#[derive(Debug, Clone)]
pub struct CardNormalizer<'a> {
    role: Role,
    allowed_urls: Option<&'a [String]>,
}

impl<'a> CardNormalizer<'a> {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            allowed_urls: None,
        }
    }

    /// Restrict citations to `urls`, in order. An empty list means no
    /// restriction.
    pub fn with_allowed_urls(mut self, urls: &'a [String]) -> Self {
        self.allowed_urls = if urls.is_empty() { None } else { Some(urls) };
        self
    }

    /// Parse and normalise provider text in one step.
    pub fn normalize_text(&self, text: &str) -> Vec<InsightCard> {
        self.normalize(parse_raw_cards(text))
    }

    pub fn normalize(&self, raw: Vec<RawCard>) -> Vec<InsightCard> {
        let mut seen_titles = HashSet::new();
        let mut urls = UrlAssigner::new(self.allowed_urls);
        let mut cards = Vec::with_capacity(raw.len());

        for item in raw {
            let mut card = self.build(item);
            if !seen_titles.insert(card.title_key()) {
                tracing::debug!("[normalizer] dropping repeated title {:?}", card.title);
                continue;
            }
            card.source_url = urls.assign(card.source_url.take());
            cards.push(card);
        }
        cards
    }

    fn build(&self, raw: RawCard) -> InsightCard {
        let title = non_blank(raw.title).unwrap_or_else(|| format!("Card {}", raw.position));
        let impact = raw
            .impact
            .as_deref()
            .map(Impact::from_label)
            .unwrap_or_default();
        let why_it_matters = normalize_why(raw.why_it_matters.as_deref(), &title, impact, self.role);

        InsightCard {
            confidence_score: raw.confidence_score.unwrap_or(0).clamp(0, 100) as u8,
            source: normalize_source(raw.source.as_deref()),
            insight: non_blank(raw.insight),
            data_evidence: non_blank(raw.data_evidence).unwrap_or_else(|| NO_DATA.to_string()),
            baseline_pct: valid_pct(raw.baseline_pct),
            current_trend_pct: valid_pct(raw.current_trend_pct),
            source_url: raw.source_url.as_deref().and_then(well_formed_url),
            title,
            impact,
            why_it_matters,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Percentages are meaningful only in 1..=100; zero means "no value".
fn valid_pct(value: Option<i64>) -> Option<u8> {
    value.filter(|v| (1..=100).contains(v)).map(|v| v as u8)
}

fn well_formed_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(trimmed.to_string()),
        _ => None,
    }
}

fn normalize_source(raw: Option<&str>) -> String {
    let source = raw.map(str::trim).unwrap_or_default();
    if source.is_empty() {
        return SOURCE_NOT_AVAILABLE.to_string();
    }
    let lower = source.to_lowercase();
    if lower == "web search" || lower == "websearch" {
        return GENERIC_WEB_SOURCE.to_string();
    }
    let words: Vec<&str> = source.split_whitespace().collect();
    if words.len() <= MAX_SOURCE_WORDS
        || EXEMPT_SOURCES.contains(&lower.as_str())
        || lower.starts_with("not available")
    {
        return source.to_string();
    }
    words[..MAX_SOURCE_WORDS].join(" ")
}

/// Why-it-matters is never a placeholder; synthesise one from context.
pub fn normalize_why(raw: Option<&str>, title: &str, impact: Impact, role: Role) -> String {
    let value = raw.map(str::trim).unwrap_or_default();
    if !WHY_PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
        return value.to_string();
    }
    let angle = match role {
        Role::Tenant => "relevant for negotiating lower or fair rent",
        Role::Landlord => "relevant for supporting rent levels or lease terms",
        Role::Broker => "relevant to lease negotiation and market position",
    };
    let title = if title.trim().is_empty() { "this topic" } else { title };
    format!(
        "This insight on {} is {} given the {} impact.",
        title, angle, impact
    )
}

/// Hands out source URLs so no two cards in one pass share one.
struct UrlAssigner<'a> {
    allowed: Option<&'a [String]>,
    cursor: usize,
    used: HashSet<String>,
}

impl<'a> UrlAssigner<'a> {
    fn new(allowed: Option<&'a [String]>) -> Self {
        Self {
            allowed,
            cursor: 0,
            used: HashSet::new(),
        }
    }

    fn assign(&mut self, url: Option<String>) -> Option<String> {
        let Some(allowed) = self.allowed else {
            return url;
        };
        match url {
            Some(u) if allowed.contains(&u) && !self.used.contains(&u) => {
                self.used.insert(u.clone());
                Some(u)
            }
            _ => self.backfill(allowed),
        }
    }

    /// Next allowed URL not yet used, in list order.
    fn backfill(&mut self, allowed: &[String]) -> Option<String> {
        while self.cursor < allowed.len() {
            let candidate = &allowed[self.cursor];
            self.cursor += 1;
            if self.used.insert(candidate.clone()) {
                return Some(candidate.clone());
            }
        }
        None
    }
}

/// First card of a single-card response, normalised.
pub fn first_card(text: &str, role: Role) -> Option<InsightCard> {
    CardNormalizer::new(role).normalize_text(text).into_iter().next()
}
