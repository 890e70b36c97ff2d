use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Canceled,
    Expired,
    Paused,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "expired" => Ok(SubscriptionStatus::Expired),
            "paused" => Ok(SubscriptionStatus::Paused),
            other => Err(format!("unknown subscription status `{other}`")),
        }
    }
}

/// One row per user. Written only by the billing reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan_slug: Option<String>,
    pub product_id: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_expires_at: Option<OffsetDateTime>,
    pub original_transaction_id: Option<String>,
    pub auto_renew: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    pub last_event_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_event_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Whether the subscription currently unlocks paid features.
    ///
    /// Canceled subscriptions keep access until the paid period ends; the
    /// EXPIRATION event is what revokes entitlements.
    pub fn grants_pro_access(&self, now: OffsetDateTime) -> bool {
        match self.status {
            SubscriptionStatus::Trial | SubscriptionStatus::Active => true,
            SubscriptionStatus::Canceled => self
                .subscription_expires_at
                .map(|expires| expires > now)
                .unwrap_or(false),
            SubscriptionStatus::Expired | SubscriptionStatus::Paused => false,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for Subscription {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<SubscriptionStatus>()
            .map_err(|err| sqlx::Error::Decode(err.into()))?;

        Ok(Subscription {
            user_id: row.try_get("user_id")?,
            plan_slug: row.try_get("plan_slug")?,
            product_id: row.try_get("product_id")?,
            status,
            subscription_started_at: row.try_get("subscription_started_at")?,
            subscription_expires_at: row.try_get("subscription_expires_at")?,
            trial_started_at: row.try_get("trial_started_at")?,
            trial_expires_at: row.try_get("trial_expires_at")?,
            original_transaction_id: row.try_get("original_transaction_id")?,
            auto_renew: row.try_get("auto_renew")?,
            canceled_at: row.try_get("canceled_at")?,
            last_event_id: row.try_get("last_event_id")?,
            last_event_at: row.try_get("last_event_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// What the reconciler does to the entitlement rows alongside a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChange {
    GrantPro,
    RevokePro { free_daily_limit: i32 },
    Unchanged,
}

/// A fully resolved state change for one user, applied atomically by
/// [`crate::db::subscription_repository::SubscriptionRepository::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionTransition {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub plan_slug: Option<String>,
    pub product_id: Option<String>,
    pub subscription_started_at: Option<OffsetDateTime>,
    pub subscription_expires_at: Option<OffsetDateTime>,
    pub trial_started_at: Option<OffsetDateTime>,
    pub trial_expires_at: Option<OffsetDateTime>,
    pub original_transaction_id: Option<String>,
    pub auto_renew: bool,
    pub canceled_at: Option<OffsetDateTime>,
    pub event_id: String,
    pub event_at: OffsetDateTime,
    pub entitlements: EntitlementChange,
    pub applied_at: OffsetDateTime,
}

impl SubscriptionTransition {
    /// Merge onto the currently stored row. Fields the event did not carry keep
    /// their stored value, mirroring the COALESCE upsert in Postgres.
    pub fn merge_into(&self, existing: Option<&Subscription>) -> Subscription {
        let keep = |new: Option<OffsetDateTime>, old: Option<OffsetDateTime>| new.or(old);
        Subscription {
            user_id: self.user_id,
            plan_slug: self.merged_plan_slug(existing),
            product_id: self
                .product_id
                .clone()
                .or_else(|| existing.and_then(|s| s.product_id.clone())),
            status: self.status,
            subscription_started_at: keep(
                self.subscription_started_at,
                existing.and_then(|s| s.subscription_started_at),
            ),
            subscription_expires_at: keep(
                self.subscription_expires_at,
                existing.and_then(|s| s.subscription_expires_at),
            ),
            trial_started_at: keep(
                self.trial_started_at,
                existing.and_then(|s| s.trial_started_at),
            ),
            trial_expires_at: keep(
                self.trial_expires_at,
                existing.and_then(|s| s.trial_expires_at),
            ),
            original_transaction_id: self
                .original_transaction_id
                .clone()
                .or_else(|| existing.and_then(|s| s.original_transaction_id.clone())),
            auto_renew: self.auto_renew,
            canceled_at: self.merged_canceled_at(existing),
            last_event_id: Some(self.event_id.clone()),
            last_event_at: Some(self.event_at),
            updated_at: self.applied_at,
        }
    }

    /// A product on the event decides the plan outright, unmapped included.
    fn merged_plan_slug(&self, existing: Option<&Subscription>) -> Option<String> {
        match self.product_id {
            Some(_) => self.plan_slug.clone(),
            None => existing.and_then(|s| s.plan_slug.clone()),
        }
    }

    /// Re-entering trial/active clears the cancellation mark; any other
    /// status keeps the stored one unless the event sets a new one.
    fn merged_canceled_at(&self, existing: Option<&Subscription>) -> Option<OffsetDateTime> {
        match self.status {
            SubscriptionStatus::Trial | SubscriptionStatus::Active => None,
            _ => self
                .canceled_at
                .or_else(|| existing.and_then(|s| s.canceled_at)),
        }
    }

    /// True when `existing` already reflects a newer event than this one.
    pub fn is_older_than(&self, existing: &Subscription) -> bool {
        existing
            .last_event_at
            .map(|stored| self.event_at < stored)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(Subscription),
    /// A newer event is already stored; nothing was written.
    Stale { stored_event_at: Option<OffsetDateTime> },
}
