use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::error;

use crate::models::plan::tier_for;
use crate::responses::JsonResponse;
use crate::routes::auth::session::AuthSession;
use crate::state::AppState;

// GET /subscription
pub async fn get_subscription(State(state): State<AppState>, session: AuthSession) -> Response {
    match state.subscriptions.find_by_user(session.user_id).await {
        Ok(subscription) => {
            let tier = tier_for(subscription.as_ref(), OffsetDateTime::now_utc());
            Json(json!({
                "user_id": session.user_id,
                "tier": tier,
                "subscription": subscription,
            }))
            .into_response()
        }
        Err(err) => {
            error!(?err, user_id = %session.user_id, "failed to load subscription");
            JsonResponse::server_error("Failed to load subscription").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::db::mock_db::MockDb;
    use crate::models::subscription::{Subscription, SubscriptionStatus};
    use crate::routes::router;
    use crate::state::test_support::{bearer_for, test_state};

    async fn fetch(db: MockDb, user: Uuid) -> (StatusCode, Value) {
        let res = router(test_state(db, None))
            .oneshot(
                Request::builder()
                    .uri("/subscription")
                    .header(header::AUTHORIZATION, bearer_for(user))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn free_user_without_subscription() {
        let user = Uuid::new_v4();
        let (status, json) = fetch(MockDb::new(), user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tier"], "free");
        assert!(json["subscription"].is_null());
    }

    #[tokio::test]
    async fn canceled_subscription_keeps_plan_tier_until_expiry() {
        let user = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let db = MockDb::new().with_subscription(Subscription {
            user_id: user,
            plan_slug: Some("pro_quarterly".into()),
            product_id: Some("upsc_pro_quarterly".into()),
            status: SubscriptionStatus::Canceled,
            subscription_started_at: Some(now - Duration::days(60)),
            subscription_expires_at: Some(now + Duration::days(30)),
            trial_started_at: None,
            trial_expires_at: None,
            original_transaction_id: Some("GPA.9".into()),
            auto_renew: false,
            canceled_at: Some(now - Duration::days(1)),
            last_event_id: Some("evt_cancel".into()),
            last_event_at: Some(now - Duration::days(1)),
            updated_at: now,
        });

        let (status, json) = fetch(db, user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tier"], "pro_quarterly");
        assert_eq!(json["subscription"]["status"], "canceled");
        assert_eq!(json["subscription"]["auto_renew"], false);
    }
}
