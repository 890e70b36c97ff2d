use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::billing_event_log_repository::BillingEventLogRepository;
use crate::models::billing_event::BillingEventLogEntry;

pub struct PostgresBillingEventLogRepository {
    pub pool: PgPool,
}

#[async_trait]
impl BillingEventLogRepository for PostgresBillingEventLogRepository {
    async fn record(&self, entry: &BillingEventLogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO billing_webhook_events
                (event_id, event_type, app_user_id, user_id, product_id,
                 original_transaction_id, outcome, error_message, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.event_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.app_user_id)
        .bind(entry.user_id)
        .bind(&entry.product_id)
        .bind(&entry.original_transaction_id)
        .bind(entry.outcome.as_str())
        .bind(&entry.error_message)
        .bind(entry.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
