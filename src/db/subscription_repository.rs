use async_trait::async_trait;
use uuid::Uuid;

use crate::models::subscription::{Subscription, SubscriptionTransition, TransitionOutcome};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error>;

    /// Upsert the subscription row and grant/revoke the pro entitlements in a
    /// single transaction. Transitions older than the stored `last_event_at`
    /// are rejected without writing anything.
    async fn apply_transition(
        &self,
        transition: &SubscriptionTransition,
    ) -> Result<TransitionOutcome, sqlx::Error>;
}
