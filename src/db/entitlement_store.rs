use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::entitlement::{Entitlement, EntitlementDecision};

/// Authoritative per-user, per-feature access state.
///
/// `lookup` and `increment` are separate round trips. Two concurrent callers
/// can both observe `allowed` before either increments, so usage may overshoot
/// a limit by up to the number of concurrent requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// `Ok(None)` when no entitlement row exists for the pair.
    async fn lookup(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<EntitlementDecision>, sqlx::Error>;

    /// Count one use and return the updated row.
    async fn increment(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Entitlement>, sqlx::Error>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Entitlement>, sqlx::Error>;
}
