//! Research topics and batching.

/// Cards requested per provider call.
pub const BATCH_SIZE: usize = 5;

/// Research dimensions, in the order they are analysed.
pub const CARD_TOPICS: [&str; 16] = [
    "Income shifts (local income, higher/lower vs expected)",
    "Traffic counts (current vs future, higher/lower)",
    "Rent averages (same property, area, historical)",
    "Rent forecast (today vs future, up or down)",
    "Nearby infrastructure developments (effect on rents)",
    "Co-tenancy mix (e.g. anchor tenant commitment, category clustering)",
    "Demographics & consumer buying capacity",
    "Footfall",
    "Local vacancy (new projects, tenant leverage to request lower rent)",
    "Tenant business category trends (e.g. apparel growth in area)",
    "Tenant / landlord risk (RAW FACTS ONLY: brand, cash, payment history, disputes, loans)",
    "Upcoming building maintenance (e.g. HVAC)",
    "Market activity & trends (area and tenant category)",
    "Sales comps (portfolio vs this lease, comp brands, avg lease term, competitors in property)",
    "Portfolio data (user-provided only)",
    "NOI vs cashflow & avg occupancy (landlord: NOI to run building, occupancy level)",
];

/// A slice of the topic list processed in one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicBatch<'a> {
    /// 1-based position of the batch
    pub index: usize,
    pub topics: &'a [&'a str],
}

/// Split `topics` into consecutive batches of at most `size`.
pub fn batches<'a>(topics: &'a [&'a str], size: usize) -> Vec<TopicBatch<'a>> {
    topics
        .chunks(size.max(1))
        .enumerate()
        .map(|(i, chunk)| TopicBatch {
            index: i + 1,
            topics: chunk,
        })
        .collect()
}

/// Topic name without its parenthetical qualifier.
pub fn short_topic(topic: &str) -> &str {
    match topic.find(" (") {
        Some(pos) => &topic[..pos],
        None => topic,
    }
}
