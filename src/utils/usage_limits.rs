use time::{Date, OffsetDateTime, UtcOffset};

use crate::models::entitlement::{
    DecisionReason, Entitlement, EntitlementDecision, LimitType, UsageSnapshot,
};

/// Start of the usage window `now` falls in, or `None` for limit types that
/// never reset.
pub fn window_start(limit_type: LimitType, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let today = now.to_offset(UtcOffset::UTC).date();
    match limit_type {
        LimitType::Daily => Some(today.midnight().assume_utc()),
        LimitType::Monthly => Date::from_calendar_date(today.year(), today.month(), 1)
            .ok()
            .map(|first| first.midnight().assume_utc()),
        LimitType::Unlimited | LimitType::None => None,
    }
}

/// Usage that counts against the limit right now. A row whose last reset
/// predates the current window has not been reset yet, so counts as zero.
pub fn effective_usage(entitlement: &Entitlement, now: OffsetDateTime) -> i32 {
    match window_start(entitlement.limit_type, now) {
        Some(start) if entitlement.last_reset_at < start => 0,
        _ => entitlement.usage_count,
    }
}

pub fn usage_snapshot(entitlement: &Entitlement, now: OffsetDateTime) -> Option<UsageSnapshot> {
    match entitlement.limit_type {
        LimitType::Unlimited => None,
        LimitType::None => Some(UsageSnapshot::new(0, 0)),
        LimitType::Daily | LimitType::Monthly => Some(UsageSnapshot::new(
            effective_usage(entitlement, now),
            entitlement.limit_value.unwrap_or(0),
        )),
    }
}

pub fn evaluate(entitlement: &Entitlement, tier: String, now: OffsetDateTime) -> EntitlementDecision {
    let usage = usage_snapshot(entitlement, now);
    let (allowed, reason) = match entitlement.limit_type {
        LimitType::Unlimited => (true, DecisionReason::Unlimited),
        LimitType::None => (false, DecisionReason::FeatureNotInTier),
        LimitType::Daily | LimitType::Monthly => match entitlement.limit_value {
            None | Some(0) => (false, DecisionReason::FeatureNotInTier),
            Some(limit) if effective_usage(entitlement, now) >= limit => {
                (false, DecisionReason::LimitExceeded)
            }
            Some(_) => (true, DecisionReason::WithinLimit),
        },
    };

    EntitlementDecision {
        allowed,
        reason,
        tier,
        usage,
    }
}

/// Count one use, rolling the window over first when it has elapsed.
/// Does not compare against the limit.
pub fn record_use(entitlement: &mut Entitlement, now: OffsetDateTime) {
    match window_start(entitlement.limit_type, now) {
        Some(start) if entitlement.last_reset_at < start => {
            entitlement.usage_count = 1;
            entitlement.last_reset_at = now;
        }
        _ => entitlement.usage_count = entitlement.usage_count.saturating_add(1),
    }
}
