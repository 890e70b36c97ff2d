use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{
    billing_event_log_repository::BillingEventLogRepository, entitlement_store::EntitlementStore,
    subscription_repository::SubscriptionRepository, user_directory::UserDirectory,
};
use crate::models::billing_event::BillingEventLogEntry;
use crate::models::entitlement::{Entitlement, EntitlementDecision, LimitType};
use crate::models::plan::{tier_for, PRO_FEATURES};
use crate::models::subscription::{
    EntitlementChange, Subscription, SubscriptionTransition, TransitionOutcome,
};
use crate::utils::usage_limits::{evaluate, record_use};

/// In-memory stand-in for every repository trait, sharing one state so
/// reconciler writes are visible to the gate.
#[derive(Clone, Default)]
pub struct MockDb {
    pub users: Arc<Mutex<HashMap<String, Uuid>>>,
    pub subscriptions: Arc<Mutex<HashMap<Uuid, Subscription>>>,
    pub entitlements: Arc<Mutex<HashMap<(Uuid, String), Entitlement>>>,
    pub audit_log: Arc<Mutex<Vec<BillingEventLogEntry>>>,
    pub lookups: Arc<Mutex<usize>>,
    pub increments: Arc<Mutex<usize>>,
    pub fail_lookups: bool,
    pub fail_transitions: bool,
    pub fail_audit_log: bool,
}

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, email: &str, user_id: Uuid) -> Self {
        self.users
            .lock()
            .unwrap()
            .insert(email.to_lowercase(), user_id);
        self
    }

    pub fn with_entitlement(
        self,
        user_id: Uuid,
        feature_slug: &str,
        limit_type: LimitType,
        limit_value: Option<i32>,
        usage_count: i32,
    ) -> Self {
        self.entitlements.lock().unwrap().insert(
            (user_id, feature_slug.to_string()),
            Entitlement {
                user_id,
                feature_slug: feature_slug.to_string(),
                limit_type,
                limit_value,
                usage_count,
                last_reset_at: OffsetDateTime::now_utc(),
            },
        );
        self
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.user_id, subscription);
        self
    }

    pub fn entitlement(&self, user_id: Uuid, feature_slug: &str) -> Option<Entitlement> {
        self.entitlements
            .lock()
            .unwrap()
            .get(&(user_id, feature_slug.to_string()))
            .cloned()
    }

    pub fn subscription(&self, user_id: Uuid) -> Option<Subscription> {
        self.subscriptions.lock().unwrap().get(&user_id).cloned()
    }

    pub fn entitlements_for(&self, user_id: Uuid) -> Vec<Entitlement> {
        let mut rows: Vec<Entitlement> = self
            .entitlements
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.feature_slug.cmp(&b.feature_slug));
        rows
    }

    pub fn lookup_count(&self) -> usize {
        *self.lookups.lock().unwrap()
    }

    pub fn audit_entries(&self) -> Vec<BillingEventLogEntry> {
        self.audit_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntitlementStore for MockDb {
    async fn lookup(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<EntitlementDecision>, sqlx::Error> {
        *self.lookups.lock().unwrap() += 1;
        if self.fail_lookups {
            return Err(mock_failure());
        }

        let entitlement = match self.entitlement(user_id, feature_slug) {
            Some(row) => row,
            None => return Ok(None),
        };
        let subscription = self.subscription(user_id);
        let tier = tier_for(subscription.as_ref(), now);
        Ok(Some(evaluate(&entitlement, tier, now)))
    }

    async fn increment(
        &self,
        user_id: Uuid,
        feature_slug: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Entitlement>, sqlx::Error> {
        *self.increments.lock().unwrap() += 1;
        let mut rows = self.entitlements.lock().unwrap();
        Ok(rows
            .get_mut(&(user_id, feature_slug.to_string()))
            .map(|row| {
                record_use(row, now);
                row.clone()
            }))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Entitlement>, sqlx::Error> {
        if self.fail_lookups {
            return Err(mock_failure());
        }
        Ok(self.entitlements_for(user_id))
    }
}

#[async_trait]
impl SubscriptionRepository for MockDb {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Subscription>, sqlx::Error> {
        Ok(self.subscription(user_id))
    }

    async fn apply_transition(
        &self,
        transition: &SubscriptionTransition,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        if self.fail_transitions {
            return Err(mock_failure());
        }

        let mut subscriptions = self.subscriptions.lock().unwrap();
        let existing = subscriptions.get(&transition.user_id);
        if let Some(stored) = existing {
            if transition.is_older_than(stored) {
                return Ok(TransitionOutcome::Stale {
                    stored_event_at: stored.last_event_at,
                });
            }
        }

        let merged = transition.merge_into(existing);
        subscriptions.insert(transition.user_id, merged.clone());

        let mut entitlements = self.entitlements.lock().unwrap();
        for slug in PRO_FEATURES {
            let key = (transition.user_id, slug.to_string());
            match transition.entitlements {
                EntitlementChange::GrantPro => {
                    let row = entitlements.entry(key).or_insert_with(|| Entitlement {
                        user_id: transition.user_id,
                        feature_slug: slug.to_string(),
                        limit_type: LimitType::Unlimited,
                        limit_value: None,
                        usage_count: 0,
                        last_reset_at: transition.applied_at,
                    });
                    row.limit_type = LimitType::Unlimited;
                    row.limit_value = None;
                }
                EntitlementChange::RevokePro { free_daily_limit } => {
                    entitlements.insert(
                        key,
                        Entitlement {
                            user_id: transition.user_id,
                            feature_slug: slug.to_string(),
                            limit_type: LimitType::Daily,
                            limit_value: Some(free_daily_limit),
                            usage_count: 0,
                            last_reset_at: transition.applied_at,
                        },
                    );
                }
                EntitlementChange::Unchanged => {}
            }
        }

        Ok(TransitionOutcome::Applied(merged))
    }
}

#[async_trait]
impl UserDirectory for MockDb {
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(&email.trim().to_lowercase())
            .copied())
    }
}

#[async_trait]
impl BillingEventLogRepository for MockDb {
    async fn record(&self, entry: &BillingEventLogEntry) -> Result<(), sqlx::Error> {
        if self.fail_audit_log {
            return Err(mock_failure());
        }
        self.audit_log.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
