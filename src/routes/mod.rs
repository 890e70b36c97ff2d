pub mod auth;
pub mod billing_webhook;
pub mod entitlements;
pub mod subscription;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::responses::JsonResponse;
use crate::state::AppState;

/// Application routes with state applied. Transport layers (CORS, tracing,
/// rate limiting) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route(
            "/entitlements/check",
            post(entitlements::check_entitlement).get(entitlements::check_entitlement_query),
        )
        .route("/entitlements", get(entitlements::list_entitlements))
        .route("/subscription", get(subscription::get_subscription))
        .route(
            "/webhooks/billing",
            post(billing_webhook::billing_webhook).get(billing_webhook::billing_webhook_info),
        )
        .with_state(state)
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("UPSC prep backend is running").into_response()
}
