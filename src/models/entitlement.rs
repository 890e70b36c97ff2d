use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Unlimited,
    Daily,
    Monthly,
    /// Feature is not part of the user's tier at all.
    None,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Unlimited => "unlimited",
            LimitType::Daily => "daily",
            LimitType::Monthly => "monthly",
            LimitType::None => "none",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "unlimited" => Ok(LimitType::Unlimited),
            "daily" => Ok(LimitType::Daily),
            "monthly" => Ok(LimitType::Monthly),
            "none" => Ok(LimitType::None),
            other => Err(format!("unknown limit type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub feature_slug: String,
    pub limit_type: LimitType,
    pub limit_value: Option<i32>,
    pub usage_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub last_reset_at: OffsetDateTime,
}

impl<'r> FromRow<'r, PgRow> for Entitlement {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let limit_type: String = row.try_get("limit_type")?;
        let limit_type = limit_type
            .parse::<LimitType>()
            .map_err(|err| sqlx::Error::Decode(err.into()))?;

        Ok(Entitlement {
            user_id: row.try_get("user_id")?,
            feature_slug: row.try_get("feature_slug")?,
            limit_type,
            limit_value: row.try_get("limit_value")?,
            usage_count: row.try_get("usage_count")?,
            last_reset_at: row.try_get("last_reset_at")?,
        })
    }
}

/// Business reasons attached to a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Unlimited,
    WithinLimit,
    LimitExceeded,
    FeatureNotInTier,
    CheckFailed,
    Unauthorized,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Unlimited => "unlimited",
            DecisionReason::WithinLimit => "within_limit",
            DecisionReason::LimitExceeded => "limit_exceeded",
            DecisionReason::FeatureNotInTier => "feature_not_in_tier",
            DecisionReason::CheckFailed => "check_failed",
            DecisionReason::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub current: i32,
    pub limit: i32,
    pub remaining: i32,
}

impl UsageSnapshot {
    pub fn new(current: i32, limit: i32) -> Self {
        Self {
            current,
            limit,
            remaining: (limit - current).max(0),
        }
    }
}

/// Result of an [`crate::db::entitlement_store::EntitlementStore`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub tier: String,
    /// `None` for unlimited features.
    pub usage: Option<UsageSnapshot>,
}

/// Wire shape returned by the entitlement endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCheck {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub show_paywall: bool,
    pub upgrade_cta: String,
    pub usage: Option<UsageSnapshot>,
    pub tier: String,
}

impl EntitlementCheck {
    pub fn from_decision(decision: EntitlementDecision, upgrade_cta: &str) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason,
            show_paywall: !decision.allowed,
            upgrade_cta: upgrade_cta.to_string(),
            usage: decision.usage,
            tier: decision.tier,
        }
    }

    fn denied(reason: DecisionReason, upgrade_cta: &str) -> Self {
        Self {
            allowed: false,
            reason,
            show_paywall: true,
            upgrade_cta: upgrade_cta.to_string(),
            usage: None,
            tier: crate::models::plan::FREE_TIER.to_string(),
        }
    }

    pub fn check_failed(upgrade_cta: &str) -> Self {
        Self::denied(DecisionReason::CheckFailed, upgrade_cta)
    }

    pub fn unauthorized(upgrade_cta: &str) -> Self {
        Self::denied(DecisionReason::Unauthorized, upgrade_cta)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementCheckRequest {
    pub feature_slug: Option<String>,
    #[serde(default)]
    pub increment_usage: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementCheckQuery {
    pub feature: Option<String>,
    #[serde(default)]
    pub increment_usage: bool,
}

impl From<EntitlementCheckQuery> for EntitlementCheckRequest {
    fn from(query: EntitlementCheckQuery) -> Self {
        Self {
            feature_slug: query.feature,
            increment_usage: query.increment_usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_goes_negative() {
        let usage = UsageSnapshot::new(5, 3);
        assert_eq!(usage.remaining, 0);
        assert_eq!(UsageSnapshot::new(1, 3).remaining, 2);
    }

    #[test]
    fn check_failed_shape_shows_paywall() {
        let check = EntitlementCheck::check_failed("Go pro");
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "check_failed");
        assert_eq!(json["show_paywall"], true);
        assert_eq!(json["upgrade_cta"], "Go pro");
        assert!(json["usage"].is_null());
        assert_eq!(json["tier"], "free");
    }

    #[test]
    fn allowed_decision_hides_paywall() {
        let check = EntitlementCheck::from_decision(
            EntitlementDecision {
                allowed: true,
                reason: DecisionReason::WithinLimit,
                tier: "free".into(),
                usage: Some(UsageSnapshot::new(1, 3)),
            },
            "Go pro",
        );
        assert!(!check.show_paywall);
        assert_eq!(check.usage.map(|u| u.remaining), Some(2));
    }
}
