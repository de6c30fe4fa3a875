//! Prompt text and instruction builders.
//!
//! The wording is configuration; the builders fix which facts reach the
//! model and how much of each.

use lease_insight_core::{DashboardSummary, InsightCard};
use lease_insight_llm::search::truncate_chars;

use crate::models::session::SessionRecord;

/// Document context limit for one card batch.
pub const BATCH_DOCUMENT_CHARS: usize = 15_000;

/// Document context limit for the dashboard call.
pub const DASHBOARD_DOCUMENT_CHARS: usize = 4_000;
pub const DASHBOARD_MAX_CARDS: usize = 30;
const DASHBOARD_EVIDENCE_CHARS: usize = 250;
const DASHBOARD_WHY_CHARS: usize = 200;

/// Document context limit for chat.
pub const CHAT_DOCUMENT_CHARS: usize = 12_000;
pub const CHAT_MAX_CARDS: usize = 25;
const CHAT_EVIDENCE_CHARS: usize = 200;
const CHAT_WHY_CHARS: usize = 150;

/// Document limit for a single card create or edit.
const CARD_DOCUMENT_CHARS: usize = 8_000;

pub const RESEARCH_SYSTEM: &str = r#"You are a research analyst supporting a retail lease negotiation. The user has chosen one role and every judgement you make is relative to that role.

Roles:
- tenant: find evidence that lets the tenant pay less or argue for fair rent.
- landlord: find evidence that justifies the asking rent.
- broker: present balanced evidence that matters to both sides.

Impact is role-relative. Label a card "positive" when the evidence helps the chosen role, "negative" when it helps the other side and "neutral" when it is mixed or inconclusive. Use a realistic mix of labels.

Do not invent data. If nothing is found for a topic, still return a card with confidence_score 0, source "Not available" and data_evidence "No data", and explain in why_it_matters why the topic would matter if data existed. "Tenant / landlord risk" takes verifiable facts only. "Portfolio data" uses user-provided documents only.

Each card has:
- title: short and unique within the response
- impact: "positive" | "neutral" | "negative"
- confidence_score: integer 0-100
- source: a 3-4 word source name, or "Not available"
- insight: one sentence stating the finding
- data_evidence: raw figures or a quote from the source, never a restatement of the insight
- why_it_matters: one or two sentences on negotiation leverage for the role, never a placeholder
- baseline_pct: historical or baseline level 1-100, or null
- current_trend_pct: current or trend level 1-100, or null
- source_url: the exact URL of the source, or null; never guess a URL

Return only a JSON object, no markdown:
{"cards": [{"title": "...", "impact": "...", "confidence_score": 0, "source": "...", "insight": "...", "data_evidence": "...", "why_it_matters": "...", "baseline_pct": null, "current_trend_pct": null, "source_url": null}]}
One card per requested topic, in the requested order."#;

pub const SEARCH_TOOL_INSTRUCTIONS: &str = r#"

Web search: you can call web_search(query). Call it for each topic with a specific query that names the property area and the topic. Every card's source_url must be the exact URL of a result you received, and no two cards may share a source_url. When you have enough data, answer with the JSON object."#;

pub const QUERY_PLANNER_SYSTEM: &str = r#"You write web search queries for property market research. Given a property and a list of topics, return {"queries": ["..."]} with exactly one specific query per topic, in topic order. Each query should name the property address or area."#;

const RECOMMENDATIONS_FORMAT: &str = r#"
recommendations holds six keys, each derived only from the cards and the document context. Use "—" when the cards do not support a value.
- ideal_term: "N Years" or "N Years + M Option"; ideal_term_reasoning cites the cards behind it.
- negotiation_leverage: "Low", "Moderate" or "High" plus a brief reason; negotiation_leverage_reasoning cites vacancy, demand, risk or similar cards.
- renewals: a short renewal or escalation stance such as "Cap at 2% YoY"; renewals_reasoning cites market trends or comps."#;

pub fn dashboard_system(with_search: bool) -> String {
    let lead = if with_search {
        "You are a lease analyst with web search. Use the property details, document context and insight cards below, and search for current market rents or comparable leases when helpful."
    } else {
        "You are a lease analyst. Use only the property details, document context and insight cards below. Do not invent data."
    };
    format!(
        "{}\n\nReturn one JSON object with:\n\
         - fair_market_rent: number ($/sq ft)\n\
         - confidence_score: integer 0-100\n\
         - vs_current_pct: number\n\
         - recommendations: object (see below)\n\
         - portfolio_context: object with this_property_rent, portfolio_avg_rent, comparison_pct, comparison_text\n{}\n\n\
         Return only valid JSON, no markdown.",
        lead, RECOMMENDATIONS_FORMAT
    )
}

/// Schema used when the provider enforces structured output.
pub fn dashboard_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "fair_market_rent": {"type": "number"},
            "confidence_score": {"type": "integer"},
            "vs_current_pct": {"type": "number"},
            "recommendations": {"type": "object"},
            "portfolio_context": {"type": "object"}
        },
        "required": [
            "fair_market_rent",
            "confidence_score",
            "vs_current_pct",
            "recommendations",
            "portfolio_context"
        ]
    })
}

pub const CUSTOM_CARD_SYSTEM: &str = r#"You are a research analyst supporting a retail lease negotiation. Produce exactly one insight card on the topic the user asks about, for the property and role given. Follow the card rules: role-relative impact, no invented data, a 3-4 word source, why_it_matters never a placeholder, baseline_pct and current_trend_pct 1-100 or null, source_url exact or null.
Return only {"cards": [ { ...one card... } ]}."#;

pub const EDIT_CARD_SYSTEM: &str = r#"You revise an existing lease insight card according to the user's request. Keep every field the request does not touch. Apply the same card rules as the original research: role-relative impact, no invented data, a 3-4 word source, why_it_matters never a placeholder, percentages 1-100 or null, source_url exact or null.
Return only {"cards": [ { ...the revised card... } ]}."#;

pub const SUMMARY_SYSTEM: &str = "You are a lease document analyst. Summarize the document in one sentence, then list 3-5 key points (rent, term, parties, obligations or notable clauses), one per line.";

const CHAT_SYSTEM_TEMPLATE: &str = r#"You are the research agent for a lease negotiation.

Limit every answer to this property and its area:
{scope}

Rules:
- Answer only about the property, area and market above.
- Use only the context below. If something is not in it, say so.
- Keep answers to 2-4 short paragraphs; bullets are fine.

--- Context ---
{context}"#;

fn property_lines(record: &SessionRecord) -> Vec<String> {
    vec![
        format!("Role: {}", record.analyze_as),
        format!("Property: {}", record.property_name),
        format!("Address: {}", record.address),
        format!("Leasable area: {} sq ft", record.leasable_area),
        format!("Current base rent: ${}/sf", record.current_base_rent),
    ]
}

/// User instruction for one card batch.
pub fn batch_user_message(record: &SessionRecord, topics: &[&str]) -> String {
    let mut parts = property_lines(record);
    parts.push(String::new());
    parts.push(
        "Produce insight cards for the following topics (JSON only, unique titles):".to_string(),
    );
    for (i, topic) in topics.iter().enumerate() {
        parts.push(format!("  {}. {}", i + 1, topic));
    }
    if let Some(doc) = record.document() {
        parts.push(String::new());
        parts.push("--- Context from uploaded documents ---".to_string());
        parts.push(truncate_chars(doc, BATCH_DOCUMENT_CHARS));
    }
    parts.join("\n")
}

/// User instruction for the dashboard call.
pub fn dashboard_user_message(record: &SessionRecord, current_rent: f64, cards: &[InsightCard]) -> String {
    let or_na = |s: &str| {
        if s.trim().is_empty() {
            "N/A".to_string()
        } else {
            s.to_string()
        }
    };
    let mut parts = vec![
        format!("Property: {}", or_na(&record.property_name)),
        format!("Address: {}", or_na(&record.address)),
        format!("Leasable area: {} sq ft", or_na(&record.leasable_area)),
        format!("Current base rent: ${}/sq ft", current_rent),
    ];
    if let Some(doc) = record.document() {
        let mut snippet = truncate_chars(doc, DASHBOARD_DOCUMENT_CHARS);
        if doc.chars().count() > DASHBOARD_DOCUMENT_CHARS {
            snippet.push_str("...");
        }
        parts.push(format!("Uploaded document context:\n{}", snippet));
    }
    parts.push("\nValidation insight cards (analyze these to fill every dashboard field):".to_string());
    for card in cards.iter().take(DASHBOARD_MAX_CARDS) {
        parts.push(format!(
            "- {} ({}): evidence: {} | why it matters: {}",
            card.title,
            card.impact,
            truncate_chars(&card.data_evidence, DASHBOARD_EVIDENCE_CHARS),
            truncate_chars(&card.why_it_matters, DASHBOARD_WHY_CHARS)
        ));
    }
    format!("{}\n\nOutput the JSON object only.", parts.join("\n"))
}

/// User instruction for a new custom card.
pub fn custom_card_user_message(record: &SessionRecord, prompt: &str) -> String {
    let mut parts = property_lines(record);
    parts.push(String::new());
    parts.push(format!("Create one insight card about: {}", prompt.trim()));
    if let Some(doc) = record.document() {
        parts.push(String::new());
        parts.push("--- Context from uploaded documents ---".to_string());
        parts.push(truncate_chars(doc, CARD_DOCUMENT_CHARS));
    }
    parts.join("\n")
}

/// User instruction for revising an existing card.
pub fn edit_card_user_message(record: &SessionRecord, original: &InsightCard, prompt: &str) -> String {
    let card_json = serde_json::to_string_pretty(original).unwrap_or_default();
    let mut parts = property_lines(record);
    parts.push(String::new());
    parts.push("Current card:".to_string());
    parts.push(card_json);
    parts.push(String::new());
    parts.push(format!("Requested change: {}", prompt.trim()));
    parts.join("\n")
}

fn chat_scope(record: &SessionRecord) -> String {
    format!(
        "Role: {} | Property: {} | Address/area: {} | Leasable area: {} sq ft | Current base rent: ${}/sq ft",
        record.analyze_as,
        record.property_name,
        record.address,
        record.leasable_area,
        record.current_base_rent
    )
}

fn dashboard_lines(dash: &DashboardSummary) -> Vec<String> {
    let rec = &dash.recommendations;
    let port = &dash.portfolio_context;
    vec![
        format!(
            "Fair market rent: ${}/sq ft | Confidence: {}% | Vs current: {}%",
            dash.fair_market_rent, dash.confidence_score, dash.vs_current_pct
        ),
        format!(
            "Recommendations: Ideal term {}; Negotiation leverage: {}; Renewals: {}",
            rec.ideal_term, rec.negotiation_leverage, rec.renewals
        ),
        format!(
            "Portfolio: This property ${}/sf; Portfolio avg ${}/sf; {}",
            port.this_property_rent, port.portfolio_avg_rent, port.comparison_text
        ),
    ]
}

/// Context block for chat: property, documents, dashboard and cards.
pub fn chat_context(record: &SessionRecord) -> String {
    let mut parts = vec![
        "## Property".to_string(),
        format!(
            "Role: {}\nName: {}\nAddress: {}\nLeasable area: {} sq ft\nCurrent base rent: ${}/sq ft",
            record.analyze_as,
            record.property_name,
            record.address,
            record.leasable_area,
            record.current_base_rent
        ),
    ];

    if let Some(doc) = record.document() {
        let truncated = if doc.chars().count() <= CHAT_DOCUMENT_CHARS {
            doc.to_string()
        } else {
            format!("{}\n[... truncated]", truncate_chars(doc, CHAT_DOCUMENT_CHARS))
        };
        parts.push("\n## Uploaded documents / user content".to_string());
        parts.push(truncated);
    }

    if let Some(dash) = &record.dashboard_summary {
        parts.push("\n## Dashboard summary".to_string());
        parts.extend(dashboard_lines(dash));
    }

    if !record.cards.is_empty() {
        parts.push("\n## Validation insights (summary)".to_string());
        for card in record.cards.iter().take(CHAT_MAX_CARDS) {
            parts.push(format!(
                "- {} ({}): {}... Why: {}",
                card.title,
                card.impact,
                truncate_chars(&card.data_evidence, CHAT_EVIDENCE_CHARS),
                truncate_chars(&card.why_it_matters, CHAT_WHY_CHARS)
            ));
        }
    }

    parts.join("\n")
}

pub fn chat_system(record: &SessionRecord) -> String {
    CHAT_SYSTEM_TEMPLATE
        .replace("{scope}", &chat_scope(record))
        .replace("{context}", &chat_context(record))
}
