use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingEventType {
    InitialPurchase,
    Renewal,
    Uncancellation,
    ProductChange,
    Cancellation,
    Expiration,
    BillingIssue,
    SubscriptionPaused,
    Test,
    #[serde(other)]
    Unknown,
}

impl BillingEventType {
    /// Event types the reconciler acts on, as listed by the introspection endpoint.
    pub const SUPPORTED: [BillingEventType; 9] = [
        BillingEventType::InitialPurchase,
        BillingEventType::Renewal,
        BillingEventType::Uncancellation,
        BillingEventType::ProductChange,
        BillingEventType::Cancellation,
        BillingEventType::Expiration,
        BillingEventType::BillingIssue,
        BillingEventType::SubscriptionPaused,
        BillingEventType::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::InitialPurchase => "INITIAL_PURCHASE",
            BillingEventType::Renewal => "RENEWAL",
            BillingEventType::Uncancellation => "UNCANCELLATION",
            BillingEventType::ProductChange => "PRODUCT_CHANGE",
            BillingEventType::Cancellation => "CANCELLATION",
            BillingEventType::Expiration => "EXPIRATION",
            BillingEventType::BillingIssue => "BILLING_ISSUE",
            BillingEventType::SubscriptionPaused => "SUBSCRIPTION_PAUSED",
            BillingEventType::Test => "TEST",
            BillingEventType::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Trial,
    Intro,
    Normal,
    Prepaid,
    #[serde(other)]
    Unknown,
}

/// Provider webhook body: `{ "api_version": "1.0", "event": { .. } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub api_version: Option<String>,
    pub event: BillingEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: BillingEventType,
    #[serde(default)]
    pub app_user_id: Option<String>,
    #[serde(default)]
    pub original_app_user_id: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    #[serde(default)]
    pub purchased_at_ms: Option<i64>,
    #[serde(default)]
    pub expiration_at_ms: Option<i64>,
    #[serde(default)]
    pub event_timestamp_ms: Option<i64>,
    #[serde(default)]
    pub entitlement_ids: Option<Vec<String>>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub expiration_reason: Option<String>,
}

impl BillingEvent {
    pub fn is_trial(&self) -> bool {
        matches!(self.period_type, Some(PeriodType::Trial))
    }

    /// Identifiers to try, in order, when resolving the internal user.
    pub fn user_identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        let candidates = self
            .app_user_id
            .iter()
            .chain(self.original_app_user_id.iter())
            .chain(self.aliases.iter());
        for candidate in candidates {
            let trimmed = candidate.trim();
            if !trimmed.is_empty() && !ids.contains(&trimmed) {
                ids.push(trimmed);
            }
        }
        ids
    }
}

pub fn millis_to_datetime(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventOutcome {
    Processed,
    Stale,
    UserNotFound,
    Ignored,
    Test,
    Error,
}

impl BillingEventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventOutcome::Processed => "processed",
            BillingEventOutcome::Stale => "stale",
            BillingEventOutcome::UserNotFound => "user_not_found",
            BillingEventOutcome::Ignored => "ignored",
            BillingEventOutcome::Test => "test",
            BillingEventOutcome::Error => "error",
        }
    }
}

/// Row appended to the webhook audit trail for every delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEventLogEntry {
    pub event_id: String,
    pub event_type: BillingEventType,
    pub app_user_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub product_id: Option<String>,
    pub original_transaction_id: Option<String>,
    pub outcome: BillingEventOutcome,
    pub error_message: Option<String>,
    pub received_at: OffsetDateTime,
}

impl BillingEventLogEntry {
    pub fn for_event(
        event: &BillingEvent,
        user_id: Option<Uuid>,
        outcome: BillingEventOutcome,
        received_at: OffsetDateTime,
    ) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type,
            app_user_id: event.app_user_id.clone(),
            user_id,
            product_id: event.product_id.clone(),
            original_transaction_id: event.original_transaction_id.clone(),
            outcome,
            error_message: None,
            received_at,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
