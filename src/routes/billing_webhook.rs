use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::models::billing_event::{BillingEventType, WebhookEnvelope};
use crate::responses::JsonResponse;
use crate::services::reconciler::{ReconcileError, ReconcileOutcome};
use crate::state::AppState;
use crate::utils::webhook_signature::{
    verify_signature, SignatureCheck, SignatureError, SIGNATURE_HEADER,
};

fn signature_error_code(err: &SignatureError) -> &'static str {
    match err {
        SignatureError::Missing => "signature_missing",
        SignatureError::Malformed => "signature_malformed",
        SignatureError::Mismatch => "signature_mismatch",
    }
}

// POST /webhooks/billing
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
    match verify_signature(
        state.config.billing_webhook_secret.as_deref(),
        &body,
        provided,
    ) {
        Ok(SignatureCheck::Verified) => {}
        Ok(SignatureCheck::Skipped) => {
            debug!("billing webhook accepted without signature check (no secret configured)")
        }
        Err(err) => {
            warn!(%err, "billing webhook signature rejected");
            return JsonResponse::unauthorized_with_code(
                "Invalid webhook signature",
                signature_error_code(&err),
            )
            .into_response();
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "malformed billing webhook payload");
            return JsonResponse::bad_request("Malformed billing event").into_response();
        }
    };
    let event = envelope.event;

    match state.reconciler().apply_billing_event(&event).await {
        Ok(ReconcileOutcome::Applied {
            user_id,
            status,
            event_type,
        }) => Json(json!({
            "received": true,
            "user_id": user_id,
            "event_type": event_type.as_str(),
            "status": status,
        }))
        .into_response(),
        Ok(ReconcileOutcome::Stale {
            user_id,
            event_type,
        }) => Json(json!({
            "received": true,
            "user_id": user_id,
            "event_type": event_type.as_str(),
            "stale": true,
        }))
        .into_response(),
        Ok(ReconcileOutcome::UnknownUser { event_type }) => Json(json!({
            "received": true,
            "event_type": event_type.as_str(),
            "warning": "User not found",
        }))
        .into_response(),
        Ok(ReconcileOutcome::Test) => Json(json!({
            "received": true,
            "type": "test",
        }))
        .into_response(),
        Ok(ReconcileOutcome::Ignored { event_type }) => Json(json!({
            "received": true,
            "event_type": event_type.as_str(),
            "ignored": true,
        }))
        .into_response(),
        Err(ReconcileError::InvalidEvent(reason)) => {
            JsonResponse::bad_request(&format!("Invalid billing event: {reason}")).into_response()
        }
        Err(err @ ReconcileError::Database(_)) => {
            error!(%err, event_id = %event.id, "billing webhook processing failed");
            JsonResponse::server_error("Failed to process billing event").into_response()
        }
    }
}

// GET /webhooks/billing
pub async fn billing_webhook_info(State(state): State<AppState>) -> Response {
    let supported: Vec<&str> = BillingEventType::SUPPORTED
        .iter()
        .map(BillingEventType::as_str)
        .collect();
    Json(json!({
        "status": "ok",
        "supported_events": supported,
        "signature_verification": if state.config.webhook_signature_enabled() {
            "enabled"
        } else {
            "disabled"
        },
    }))
    .into_response()
}
