use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{
    billing_event_log_repository::BillingEventLogRepository,
    subscription_repository::SubscriptionRepository, user_directory::UserDirectory,
};
use crate::models::billing_event::{
    millis_to_datetime, BillingEvent, BillingEventLogEntry, BillingEventOutcome, BillingEventType,
};
use crate::models::plan::plan_for_product;
use crate::models::subscription::{
    EntitlementChange, SubscriptionStatus, SubscriptionTransition, TransitionOutcome,
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid billing event: {0}")]
    InvalidEvent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        user_id: Uuid,
        status: SubscriptionStatus,
        event_type: BillingEventType,
    },
    /// A newer event for this user was already applied.
    Stale {
        user_id: Uuid,
        event_type: BillingEventType,
    },
    UnknownUser {
        event_type: BillingEventType,
    },
    Test,
    Ignored {
        event_type: BillingEventType,
    },
}

/// Turns billing provider events into subscription and entitlement state.
#[derive(Clone)]
pub struct SubscriptionReconciler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    users: Arc<dyn UserDirectory>,
    event_log: Arc<dyn BillingEventLogRepository>,
    free_daily_limit: i32,
}

impl SubscriptionReconciler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserDirectory>,
        event_log: Arc<dyn BillingEventLogRepository>,
        free_daily_limit: i32,
    ) -> Self {
        Self {
            subscriptions,
            users,
            event_log,
            free_daily_limit,
        }
    }

    pub async fn apply_billing_event(
        &self,
        event: &BillingEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.apply_billing_event_at(event, OffsetDateTime::now_utc())
            .await
    }

    pub async fn apply_billing_event_at(
        &self,
        event: &BillingEvent,
        now: OffsetDateTime,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let event_type = event.event_type;

        match event_type {
            BillingEventType::Test => {
                info!(event_id = %event.id, "billing test event received");
                self.audit(BillingEventLogEntry::for_event(
                    event,
                    None,
                    BillingEventOutcome::Test,
                    now,
                ))
                .await;
                return Ok(ReconcileOutcome::Test);
            }
            BillingEventType::Unknown => {
                info!(event_id = %event.id, "ignoring unsupported billing event type");
                self.audit(BillingEventLogEntry::for_event(
                    event,
                    None,
                    BillingEventOutcome::Ignored,
                    now,
                ))
                .await;
                return Ok(ReconcileOutcome::Ignored { event_type });
            }
            _ => {}
        }

        let user_id = match self.resolve_user(event).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => {
                warn!(
                    event_id = %event.id,
                    event_type = event_type.as_str(),
                    app_user_id = ?event.app_user_id,
                    "billing event references unknown user; acknowledging without changes"
                );
                self.audit(BillingEventLogEntry::for_event(
                    event,
                    None,
                    BillingEventOutcome::UserNotFound,
                    now,
                ))
                .await;
                return Ok(ReconcileOutcome::UnknownUser { event_type });
            }
            Err(err) => {
                error!(?err, event_id = %event.id, "failed to resolve billing event user");
                self.audit(
                    BillingEventLogEntry::for_event(event, None, BillingEventOutcome::Error, now)
                        .with_error(err.to_string()),
                )
                .await;
                return Err(err.into());
            }
        };

        if event.event_timestamp_ms.is_none() {
            warn!(
                %user_id,
                event_id = %event.id,
                event_type = event_type.as_str(),
                "billing event has no timestamp; ordering it at processing time"
            );
        }

        let transition = match plan_transition(event, user_id, self.free_daily_limit, now) {
            Ok(Some(transition)) => transition,
            Ok(None) => return Ok(ReconcileOutcome::Ignored { event_type }),
            Err(err) => {
                warn!(%user_id, event_id = %event.id, %err, "rejecting billing event");
                self.audit(
                    BillingEventLogEntry::for_event(
                        event,
                        Some(user_id),
                        BillingEventOutcome::Error,
                        now,
                    )
                    .with_error(err.to_string()),
                )
                .await;
                return Err(err);
            }
        };

        if transition.plan_slug.is_none() {
            if let Some(product_id) = transition.product_id.as_deref() {
                warn!(%user_id, product_id, "billing product has no plan mapping");
            }
        }

        match self.subscriptions.apply_transition(&transition).await {
            Ok(TransitionOutcome::Applied(subscription)) => {
                info!(
                    %user_id,
                    event_id = %event.id,
                    event_type = event_type.as_str(),
                    status = %subscription.status,
                    plan = ?subscription.plan_slug,
                    "subscription reconciled"
                );
                self.audit(BillingEventLogEntry::for_event(
                    event,
                    Some(user_id),
                    BillingEventOutcome::Processed,
                    now,
                ))
                .await;
                Ok(ReconcileOutcome::Applied {
                    user_id,
                    status: subscription.status,
                    event_type,
                })
            }
            Ok(TransitionOutcome::Stale { stored_event_at }) => {
                warn!(
                    %user_id,
                    event_id = %event.id,
                    event_type = event_type.as_str(),
                    event_at = %transition.event_at,
                    stored_event_at = ?stored_event_at,
                    "skipping out-of-order billing event"
                );
                self.audit(BillingEventLogEntry::for_event(
                    event,
                    Some(user_id),
                    BillingEventOutcome::Stale,
                    now,
                ))
                .await;
                Ok(ReconcileOutcome::Stale {
                    user_id,
                    event_type,
                })
            }
            Err(err) => {
                error!(?err, %user_id, event_id = %event.id, "failed to apply subscription transition");
                self.audit(
                    BillingEventLogEntry::for_event(
                        event,
                        Some(user_id),
                        BillingEventOutcome::Error,
                        now,
                    )
                    .with_error(err.to_string()),
                )
                .await;
                Err(err.into())
            }
        }
    }

    /// UUID-shaped identifiers are taken as internal ids; anything else is
    /// looked up as an email.
    async fn resolve_user(&self, event: &BillingEvent) -> Result<Option<Uuid>, sqlx::Error> {
        for candidate in event.user_identifiers() {
            if let Ok(user_id) = Uuid::parse_str(candidate) {
                return Ok(Some(user_id));
            }
            if let Some(user_id) = self.users.find_user_id_by_email(candidate).await? {
                return Ok(Some(user_id));
            }
        }
        Ok(None)
    }

    async fn audit(&self, entry: BillingEventLogEntry) {
        if let Err(err) = self.event_log.record(&entry).await {
            warn!(
                ?err,
                event_id = %entry.event_id,
                outcome = entry.outcome.as_str(),
                "failed to write billing event audit log"
            );
        }
    }
}

fn event_time(raw: Option<i64>, field: &str) -> Result<Option<OffsetDateTime>, ReconcileError> {
    match raw {
        None => Ok(None),
        Some(ms) => millis_to_datetime(ms)
            .map(Some)
            .ok_or_else(|| ReconcileError::InvalidEvent(format!("{field} out of range: {ms}"))),
    }
}

/// Maps one event onto the subscription state it implies. `Ok(None)` for
/// types that never change state.
pub fn plan_transition(
    event: &BillingEvent,
    user_id: Uuid,
    free_daily_limit: i32,
    now: OffsetDateTime,
) -> Result<Option<SubscriptionTransition>, ReconcileError> {
    if event.id.trim().is_empty() {
        return Err(ReconcileError::InvalidEvent("event id is empty".into()));
    }

    let purchased_at = event_time(event.purchased_at_ms, "purchased_at_ms")?;
    let expires_at = event_time(event.expiration_at_ms, "expiration_at_ms")?;
    // Providers omit the timestamp on some replays; treat those as current.
    let event_at = event_time(event.event_timestamp_ms, "event_timestamp_ms")?.unwrap_or(now);

    let product_id = event
        .product_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    let plan_slug = product_id
        .as_deref()
        .and_then(plan_for_product)
        .map(str::to_string);

    let mut transition = SubscriptionTransition {
        user_id,
        status: SubscriptionStatus::Active,
        plan_slug,
        product_id,
        subscription_started_at: None,
        subscription_expires_at: expires_at,
        trial_started_at: None,
        trial_expires_at: None,
        original_transaction_id: event
            .original_transaction_id
            .clone()
            .or_else(|| event.transaction_id.clone()),
        auto_renew: true,
        canceled_at: None,
        event_id: event.id.clone(),
        event_at,
        entitlements: EntitlementChange::Unchanged,
        applied_at: now,
    };

    match event.event_type {
        BillingEventType::InitialPurchase
        | BillingEventType::Renewal
        | BillingEventType::Uncancellation
        | BillingEventType::ProductChange => {
            if event.is_trial() {
                transition.status = SubscriptionStatus::Trial;
                transition.trial_started_at = purchased_at;
                transition.trial_expires_at = expires_at;
            } else {
                transition.status = SubscriptionStatus::Active;
                transition.subscription_started_at = purchased_at;
            }
            transition.entitlements = EntitlementChange::GrantPro;
        }
        BillingEventType::Cancellation => {
            // Access continues until EXPIRATION arrives.
            transition.status = SubscriptionStatus::Canceled;
            transition.auto_renew = false;
            transition.canceled_at = Some(event_at);
        }
        BillingEventType::Expiration => {
            transition.status = SubscriptionStatus::Expired;
            transition.auto_renew = false;
            transition.entitlements = EntitlementChange::RevokePro { free_daily_limit };
        }
        BillingEventType::BillingIssue | BillingEventType::SubscriptionPaused => {
            transition.status = SubscriptionStatus::Paused;
        }
        BillingEventType::Test | BillingEventType::Unknown => return Ok(None),
    }

    Ok(Some(transition))
}
