use async_trait::async_trait;

use crate::models::billing_event::BillingEventLogEntry;

#[async_trait]
pub trait BillingEventLogRepository: Send + Sync {
    async fn record(&self, entry: &BillingEventLogEntry) -> Result<(), sqlx::Error>;
}
