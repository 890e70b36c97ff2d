use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::entitlement_store::EntitlementStore;
use crate::models::entitlement::{Entitlement, EntitlementDecision, LimitType};
use crate::models::plan::tier_for;
use crate::models::subscription::Subscription;
use crate::utils::usage_limits::{evaluate, window_start};

pub struct PostgresEntitlementStore {
    pub pool: PgPool,
}

const ENTITLEMENT_COLUMNS: &str =
    "user_id, feature_slug, limit_type, limit_value, usage_count, last_reset_at";

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn lookup(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<EntitlementDecision>, sqlx::Error> {
        let entitlement = sqlx::query_as::<_, Entitlement>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM user_entitlements WHERE user_id = $1 AND feature_slug = $2"
        ))
        .bind(user_id)
        .bind(feature_slug)
        .fetch_optional(&self.pool)
        .await?;

        let entitlement = match entitlement {
            Some(row) => row,
            None => return Ok(None),
        };

        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM user_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let tier = tier_for(subscription.as_ref(), now);
        Ok(Some(evaluate(&entitlement, tier, now)))
    }

    async fn increment(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        // Window boundaries are computed in Rust so they match `record_use`.
        let day_start = window_start(LimitType::Daily, now).unwrap_or(now);
        let month_start = window_start(LimitType::Monthly, now).unwrap_or(now);

        sqlx::query_as::<_, Entitlement>(&format!(
            r#"
            UPDATE user_entitlements
            SET usage_count = CASE
                    WHEN (limit_type = 'daily' AND last_reset_at < $3)
                      OR (limit_type = 'monthly' AND last_reset_at < $4) THEN 1
                    ELSE usage_count + 1
                END,
                last_reset_at = CASE
                    WHEN (limit_type = 'daily' AND last_reset_at < $3)
                      OR (limit_type = 'monthly' AND last_reset_at < $4) THEN $5
                    ELSE last_reset_at
                END,
                updated_at = $5
            WHERE user_id = $1 AND feature_slug = $2
            RETURNING {ENTITLEMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(feature_slug)
        .bind(day_start)
        .bind(month_start)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Entitlement>, sqlx::Error> {
        sqlx::query_as::<_, Entitlement>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM user_entitlements WHERE user_id = $1 ORDER BY feature_slug"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
