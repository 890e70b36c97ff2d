use time::OffsetDateTime;

use crate::models::subscription::Subscription;

pub const FREE_TIER: &str = "free";
/// Tier reported for a paying user whose product has no plan mapping.
pub const UNMAPPED_PRO_TIER: &str = "pro";
pub const DEFAULT_FREE_DAILY_LIMIT: i32 = 3;

/// Features unlocked by any paid plan. Granted and revoked as a block.
pub const PRO_FEATURES: &[&str] = &[
    "notes_generation",
    "video_generation",
    "question_generation",
    "answer_evaluation",
    "mock_tests",
    "current_affairs_digest",
];

const PRODUCT_PLANS: &[(&str, &str)] = &[
    ("upsc_pro_monthly", "pro_monthly"),
    ("upsc_pro_quarterly", "pro_quarterly"),
    ("upsc_pro_yearly", "pro_yearly"),
    ("upsc_pro_lifetime", "pro_lifetime"),
];

/// Maps a billing-provider product id to an internal plan slug.
pub fn plan_for_product(product_id: &str) -> Option<&'static str> {
    let product_id = product_id.trim();
    PRODUCT_PLANS
        .iter()
        .find(|(product, _)| product.eq_ignore_ascii_case(product_id))
        .map(|(_, plan)| *plan)
}

/// Tier label reported by the gate for a user's subscription state.
pub fn tier_for(subscription: Option<&Subscription>, now: OffsetDateTime) -> String {
    match subscription {
        Some(sub) if sub.grants_pro_access(now) => sub
            .plan_slug
            .clone()
            .unwrap_or_else(|| UNMAPPED_PRO_TIER.to_string()),
        _ => FREE_TIER.to_string(),
    }
}
