use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::models::entitlement::{
    DecisionReason, Entitlement, EntitlementCheck, EntitlementCheckQuery, EntitlementCheckRequest,
    LimitType,
};
use crate::responses::JsonResponse;
use crate::routes::auth::session::{AuthRejection, AuthSession};
use crate::state::AppState;

fn status_for(check: &EntitlementCheck) -> StatusCode {
    if check.allowed {
        StatusCode::OK
    } else if check.reason == DecisionReason::CheckFailed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::FORBIDDEN
    }
}

async fn run_check(
    state: &AppState,
    session: Result<AuthSession, AuthRejection>,
    request: EntitlementCheckRequest,
) -> Response {
    let upgrade_cta = state.config.upgrade_cta.as_str();

    // Authentication is resolved before any validation or lookup.
    let session = match session {
        Ok(session) => session,
        Err(rejection) => {
            debug!(?rejection, "entitlement check without valid credentials");
            return (
                StatusCode::UNAUTHORIZED,
                Json(EntitlementCheck::unauthorized(upgrade_cta)),
            )
                .into_response();
        }
    };

    let feature_slug = match request
        .feature_slug
        .as_deref()
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
    {
        Some(slug) => slug,
        None => return JsonResponse::bad_request("feature_slug is required").into_response(),
    };

    let check = state
        .entitlement_gate()
        .check(
            session.user_id,
            feature_slug,
            request.increment_usage,
            upgrade_cta,
        )
        .await;

    (status_for(&check), Json(check)).into_response()
}

// POST /entitlements/check
pub async fn check_entitlement(
    State(state): State<AppState>,
    session: Result<AuthSession, AuthRejection>,
    payload: Result<Json<EntitlementCheckRequest>, JsonRejection>,
) -> Response {
    let request = match (&session, payload) {
        (_, Ok(Json(request))) => request,
        // Unauthenticated callers get the 401 decision regardless of body.
        (Err(_), Err(_)) => EntitlementCheckRequest {
            feature_slug: None,
            increment_usage: false,
        },
        (Ok(_), Err(rejection)) => {
            return JsonResponse::bad_request(&rejection.body_text()).into_response()
        }
    };
    run_check(&state, session, request).await
}

// GET /entitlements/check?feature=<slug>&increment_usage=<bool>
pub async fn check_entitlement_query(
    State(state): State<AppState>,
    session: Result<AuthSession, AuthRejection>,
    query: Result<Query<EntitlementCheckQuery>, QueryRejection>,
) -> Response {
    let request = match (&session, query) {
        (_, Ok(Query(query))) => EntitlementCheckRequest::from(query),
        (Err(_), Err(_)) => EntitlementCheckRequest {
            feature_slug: None,
            increment_usage: false,
        },
        (Ok(_), Err(rejection)) => {
            return JsonResponse::bad_request(&rejection.body_text()).into_response()
        }
    };
    run_check(&state, session, request).await
}

#[derive(Serialize)]
struct EntitlementView {
    feature_slug: String,
    limit_type: LimitType,
    limit_value: Option<i32>,
    usage_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    last_reset_at: OffsetDateTime,
}

impl From<Entitlement> for EntitlementView {
    fn from(row: Entitlement) -> Self {
        Self {
            feature_slug: row.feature_slug,
            limit_type: row.limit_type,
            limit_value: row.limit_value,
            usage_count: row.usage_count,
            last_reset_at: row.last_reset_at,
        }
    }
}

// GET /entitlements
pub async fn list_entitlements(State(state): State<AppState>, session: AuthSession) -> Response {
    match state.entitlements.list_for_user(session.user_id).await {
        Ok(rows) => {
            let entitlements: Vec<EntitlementView> =
                rows.into_iter().map(EntitlementView::from).collect();
            Json(json!({
                "user_id": session.user_id,
                "entitlements": entitlements,
            }))
            .into_response()
        }
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to list entitlements");
            JsonResponse::server_error("Failed to load entitlements").into_response()
        }
    }
}
