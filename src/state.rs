use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    billing_event_log_repository::BillingEventLogRepository, entitlement_store::EntitlementStore,
    subscription_repository::SubscriptionRepository, user_directory::UserDirectory,
};
use crate::services::entitlement_gate::EntitlementGate;
use crate::services::reconciler::SubscriptionReconciler;
use crate::utils::jwt::{JwtKeyProvider, JwtKeys};

#[derive(Clone)]
pub struct AppState {
    pub entitlements: Arc<dyn EntitlementStore>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub billing_event_log: Arc<dyn BillingEventLogRepository>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn entitlement_gate(&self) -> EntitlementGate {
        EntitlementGate::new(self.entitlements.clone())
    }

    pub fn reconciler(&self) -> SubscriptionReconciler {
        SubscriptionReconciler::new(
            self.subscriptions.clone(),
            self.users.clone(),
            self.billing_event_log.clone(),
            self.config.free_daily_limit,
        )
    }
}

impl JwtKeyProvider for AppState {
    fn jwt_keys(&self) -> &JwtKeys {
        &self.config.jwt_keys
    }

    fn jwt_audience(&self) -> &str {
        &self.config.jwt_audience
    }

    fn jwt_issuer(&self) -> Option<&str> {
        self.config.jwt_issuer.as_deref()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::config::{LogFormat, RateLimitSettings, DEFAULT_JWT_AUDIENCE};
    use crate::db::mock_db::MockDb;
    use crate::routes::auth::claims::Claims;
    use crate::utils::jwt::create_jwt;
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    pub const TEST_JWT_SECRET: &str = "0123456789abcdef0123456789ABCDEF";
    pub const TEST_UPGRADE_CTA: &str = "Unlock unlimited UPSC prep with Pro";

    pub fn test_config(webhook_secret: Option<&str>) -> Config {
        Config {
            database_url: String::new(),
            frontend_origin: "http://localhost:5173".into(),
            bind_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_keys: JwtKeys::from_secret(TEST_JWT_SECRET).unwrap(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.into(),
            jwt_issuer: None,
            billing_webhook_secret: webhook_secret.map(str::to_string),
            upgrade_cta: TEST_UPGRADE_CTA.into(),
            free_daily_limit: 3,
            rate_limit: RateLimitSettings {
                per_millisecond: 200,
                burst: 20,
            },
            log_format: LogFormat::Pretty,
            run_migrations: false,
        }
    }

    pub fn test_state(db: MockDb, webhook_secret: Option<&str>) -> AppState {
        let db = Arc::new(db);
        AppState {
            entitlements: db.clone(),
            subscriptions: db.clone(),
            users: db.clone(),
            billing_event_log: db,
            config: Arc::new(test_config(webhook_secret)),
        }
    }

    pub fn bearer_for(user_id: Uuid) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some("aspirant@example.com".into()),
            role: Some("authenticated".into()),
            exp: exp as usize,
            aud: DEFAULT_JWT_AUDIENCE.into(),
            iss: None,
        };
        let keys = JwtKeys::from_secret(TEST_JWT_SECRET).unwrap();
        format!("Bearer {}", create_jwt(&claims, &keys).unwrap())
    }
}
