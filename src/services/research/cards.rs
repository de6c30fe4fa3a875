//! Single-card generation: new custom cards and edit proposals.

use lease_insight_core::InsightCard;
use lease_insight_llm::{cards_schema, Generated, ProviderAdapter, SearchRequest};

use super::normalizer::{first_card, CardNormalizer};
use super::orchestrator::UNCONFIGURED_WHY;
use super::prompts;
use crate::models::session::SessionRecord;
use crate::utils::error::{AppError, AppResult};

/// Longest prompt used verbatim as a placeholder title.
const MAX_PLACEHOLDER_TITLE: usize = 80;

/// Research one card on a user-chosen topic.
///
/// Search grounding is used when available. Without any provider the result
/// is a zero-confidence placeholder named after the prompt.
pub async fn create_custom_card(
    adapter: &ProviderAdapter,
    record: &SessionRecord,
    prompt: &str,
) -> AppResult<InsightCard> {
    let request = SearchRequest {
        system: prompts::CUSTOM_CARD_SYSTEM.to_string(),
        tool_instructions: prompts::SEARCH_TOOL_INSTRUCTIONS.to_string(),
        query_system: prompts::QUERY_PLANNER_SYSTEM.to_string(),
        user: prompts::custom_card_user_message(record, prompt),
        topics: vec![prompt.trim().to_string()],
        property_name: record.property_name.clone(),
        address: record.address.clone(),
    };

    match adapter
        .generate_with_search(record.llm_provider, &request, None)
        .await?
    {
        Generated::Served { provider, output } => {
            let card = CardNormalizer::new(record.analyze_as)
                .with_allowed_urls(&output.evidence_urls)
                .normalize_text(&output.text)
                .into_iter()
                .next()
                .ok_or_else(|| AppError::internal("provider returned no usable card"))?;
            tracing::info!("[cards] custom card {:?} from {}", card.title, provider);
            Ok(card)
        }
        Generated::Unconfigured => {
            tracing::warn!("[cards] no provider configured; placeholder custom card");
            let title: String = prompt.trim().chars().take(MAX_PLACEHOLDER_TITLE).collect();
            Ok(InsightCard::placeholder(title, UNCONFIGURED_WHY))
        }
    }
}

/// Propose a revision of `original`. Nothing is persisted here.
///
/// Without any provider the proposal is the original card unchanged.
pub async fn propose_card_edit(
    adapter: &ProviderAdapter,
    record: &SessionRecord,
    original: &InsightCard,
    prompt: &str,
) -> AppResult<InsightCard> {
    let user = prompts::edit_card_user_message(record, original, prompt);
    match adapter
        .generate(
            record.llm_provider,
            prompts::EDIT_CARD_SYSTEM,
            &user,
            Some(cards_schema()),
        )
        .await?
    {
        Generated::Served { provider, output } => {
            let card = first_card(&output, record.analyze_as)
                .ok_or_else(|| AppError::internal("provider returned no usable card"))?;
            tracing::info!("[cards] edit proposal for {:?} from {}", original.title, provider);
            Ok(card)
        }
        Generated::Unconfigured => {
            tracing::warn!("[cards] no provider configured; edit proposes the original card");
            Ok(original.clone())
        }
    }
}
