use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::entitlement_store::EntitlementStore;
use crate::models::entitlement::EntitlementCheck;
use crate::utils::usage_limits::usage_snapshot;

/// Allow/deny decisions for gated features. Fails closed: any store error or
/// missing row is a deny with reason `check_failed`.
#[derive(Clone)]
pub struct EntitlementGate {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementGate {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        increment_usage: bool,
        upgrade_cta: &str,
    ) -> EntitlementCheck {
        self.check_at(
            user_id,
            feature_slug,
            increment_usage,
            upgrade_cta,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn check_at(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        increment_usage: bool,
        upgrade_cta: &str,
        now: OffsetDateTime,
    ) -> EntitlementCheck {
        let decision = match self.store.lookup(user_id, feature_slug, now).await {
            Ok(Some(decision)) => decision,
            Ok(None) => {
                warn!(%user_id, feature_slug, "no entitlement row; denying");
                return EntitlementCheck::check_failed(upgrade_cta);
            }
            Err(err) => {
                error!(?err, %user_id, feature_slug, "entitlement lookup failed");
                return EntitlementCheck::check_failed(upgrade_cta);
            }
        };

        if !decision.allowed {
            info!(%user_id, feature_slug, reason = %decision.reason, tier = %decision.tier, "feature denied");
            return EntitlementCheck::from_decision(decision, upgrade_cta);
        }

        if !increment_usage {
            return EntitlementCheck::from_decision(decision, upgrade_cta);
        }

        // Separate round trip from the lookup above; concurrent requests may
        // both pass the check before either increments.
        match self.store.increment(user_id, feature_slug, now).await {
            Ok(Some(row)) => {
                let mut decision = decision;
                decision.usage = usage_snapshot(&row, now);
                EntitlementCheck::from_decision(decision, upgrade_cta)
            }
            Ok(None) => {
                warn!(%user_id, feature_slug, "entitlement row vanished before increment");
                EntitlementCheck::check_failed(upgrade_cta)
            }
            Err(err) => {
                error!(?err, %user_id, feature_slug, "entitlement usage increment failed");
                EntitlementCheck::check_failed(upgrade_cta)
            }
        }
    }
}
