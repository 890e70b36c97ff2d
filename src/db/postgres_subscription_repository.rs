use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::db::subscription_repository::SubscriptionRepository;
use crate::models::plan::PRO_FEATURES;
use crate::models::subscription::{
    EntitlementChange, Subscription, SubscriptionTransition, TransitionOutcome,
};

pub struct PostgresSubscriptionRepository {
    pub pool: PgPool,
}

fn pro_feature_slugs() -> Vec<String> {
    PRO_FEATURES.iter().map(|slug| slug.to_string()).collect()
}

async fn upsert_subscription(
    conn: &mut PgConnection,
    t: &SubscriptionTransition,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<Postgres, Subscription>(
        r#"
        INSERT INTO user_subscriptions (
            user_id, plan_slug, product_id, status,
            subscription_started_at, subscription_expires_at,
            trial_started_at, trial_expires_at,
            original_transaction_id, auto_renew, canceled_at,
            last_event_id, last_event_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (user_id) DO UPDATE SET
            plan_slug = CASE
                WHEN EXCLUDED.product_id IS NOT NULL THEN EXCLUDED.plan_slug
                ELSE user_subscriptions.plan_slug
            END,
            product_id = COALESCE(EXCLUDED.product_id, user_subscriptions.product_id),
            status = EXCLUDED.status,
            subscription_started_at = COALESCE(EXCLUDED.subscription_started_at, user_subscriptions.subscription_started_at),
            subscription_expires_at = COALESCE(EXCLUDED.subscription_expires_at, user_subscriptions.subscription_expires_at),
            trial_started_at = COALESCE(EXCLUDED.trial_started_at, user_subscriptions.trial_started_at),
            trial_expires_at = COALESCE(EXCLUDED.trial_expires_at, user_subscriptions.trial_expires_at),
            original_transaction_id = COALESCE(EXCLUDED.original_transaction_id, user_subscriptions.original_transaction_id),
            auto_renew = EXCLUDED.auto_renew,
            canceled_at = CASE
                WHEN EXCLUDED.status IN ('trial', 'active') THEN NULL
                ELSE COALESCE(EXCLUDED.canceled_at, user_subscriptions.canceled_at)
            END,
            last_event_id = EXCLUDED.last_event_id,
            last_event_at = EXCLUDED.last_event_at,
            updated_at = EXCLUDED.updated_at
        WHERE user_subscriptions.last_event_at IS NULL
           OR user_subscriptions.last_event_at <= EXCLUDED.last_event_at
        RETURNING *
        "#,
    )
    .bind(t.user_id)
    .bind(&t.plan_slug)
    .bind(&t.product_id)
    .bind(t.status.as_str())
    .bind(t.subscription_started_at)
    .bind(t.subscription_expires_at)
    .bind(t.trial_started_at)
    .bind(t.trial_expires_at)
    .bind(&t.original_transaction_id)
    .bind(t.auto_renew)
    .bind(t.canceled_at)
    .bind(&t.event_id)
    .bind(t.event_at)
    .bind(t.applied_at)
    .fetch_optional(conn)
    .await
}

async fn grant_pro(
    conn: &mut PgConnection,
    user_id: Uuid,
    now: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_entitlements
            (user_id, feature_slug, limit_type, limit_value, usage_count, last_reset_at, updated_at)
        SELECT $1, slug, 'unlimited', NULL, 0, $3, $3
        FROM UNNEST($2::text[]) AS slug
        ON CONFLICT (user_id, feature_slug) DO UPDATE SET
            limit_type = 'unlimited',
            limit_value = NULL,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(user_id)
    .bind(pro_feature_slugs())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

async fn revoke_pro(
    conn: &mut PgConnection,
    user_id: Uuid,
    free_daily_limit: i32,
    now: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_entitlements
            (user_id, feature_slug, limit_type, limit_value, usage_count, last_reset_at, updated_at)
        SELECT $1, slug, 'daily', $3, 0, $4, $4
        FROM UNNEST($2::text[]) AS slug
        ON CONFLICT (user_id, feature_slug) DO UPDATE SET
            limit_type = 'daily',
            limit_value = EXCLUDED.limit_value,
            usage_count = 0,
            last_reset_at = EXCLUDED.last_reset_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(user_id)
    .bind(pro_feature_slugs())
    .bind(free_daily_limit)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM user_subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn apply_transition(
        &self,
        transition: &SubscriptionTransition,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let applied = match upsert_subscription(&mut tx, transition).await? {
            Some(row) => row,
            None => {
                let stored_event_at = sqlx::query_scalar::<_, Option<OffsetDateTime>>(
                    "SELECT last_event_at FROM user_subscriptions WHERE user_id = $1",
                )
                .bind(transition.user_id)
                .fetch_optional(&mut *tx)
                .await?
                .flatten();
                tx.rollback().await?;
                return Ok(TransitionOutcome::Stale { stored_event_at });
            }
        };

        match transition.entitlements {
            EntitlementChange::GrantPro => {
                grant_pro(&mut tx, transition.user_id, transition.applied_at).await?
            }
            EntitlementChange::RevokePro { free_daily_limit } => {
                revoke_pro(
                    &mut tx,
                    transition.user_id,
                    free_daily_limit,
                    transition.applied_at,
                )
                .await?
            }
            EntitlementChange::Unchanged => {}
        }

        tx.commit().await?;
        debug!(user_id = %transition.user_id, status = %applied.status, "subscription transition committed");
        Ok(TransitionOutcome::Applied(applied))
    }
}
