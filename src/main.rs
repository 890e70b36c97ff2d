use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use axum::Router;
use sqlx::PgPool;
#[cfg(not(feature = "tls"))]
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use upsc_prep_backend::config::{Config, LogFormat};
use upsc_prep_backend::db::{
    billing_event_log_repository::BillingEventLogRepository,
    entitlement_store::EntitlementStore,
    postgres_billing_event_log_repository::PostgresBillingEventLogRepository,
    postgres_entitlement_store::PostgresEntitlementStore,
    postgres_subscription_repository::PostgresSubscriptionRepository,
    postgres_user_directory::PostgresUserDirectory,
    subscription_repository::SubscriptionRepository, user_directory::UserDirectory,
};
use upsc_prep_backend::responses::JsonResponse;
use upsc_prep_backend::routes::router;
use upsc_prep_backend::utils::webhook_signature::SIGNATURE_HEADER;
use upsc_prep_backend::AppState;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

const DEFAULT_LOG_FILTER: &str = "upsc_prep_backend=info,tower_http=info";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env().context("failed to load configuration")?);
    init_tracing(config.log_format);

    if !config.webhook_signature_enabled() {
        warn!(
            "BILLING_WEBHOOK_SECRET is not set; billing webhooks are accepted without signature verification"
        );
    }

    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(config.rate_limit.per_millisecond)
            .burst_size(config.rate_limit.burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter settings")?,
    );

    let governor_limiter = global_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let pg_pool = establish_connection(&config.database_url).await?;
    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pg_pool)
            .await
            .context("failed to run database migrations")?;
        info!("database migrations applied");
    }

    let state = AppState {
        entitlements: Arc::new(PostgresEntitlementStore {
            pool: pg_pool.clone(),
        }) as Arc<dyn EntitlementStore>,
        subscriptions: Arc::new(PostgresSubscriptionRepository {
            pool: pg_pool.clone(),
        }) as Arc<dyn SubscriptionRepository>,
        users: Arc::new(PostgresUserDirectory {
            pool: pg_pool.clone(),
        }) as Arc<dyn UserDirectory>,
        billing_event_log: Arc::new(PostgresBillingEventLogRepository { pool: pg_pool })
            as Arc<dyn BillingEventLogRepository>,
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(SIGNATURE_HEADER),
        ])
        .allow_credentials(true);

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: global_governor_conf,
        })
        .layer(cors);

    serve(
        app.into_make_service_with_connect_info::<SocketAddr>(),
        config.bind_addr,
    )
    .await
}

#[cfg(feature = "tls")]
async fn serve(
    make_service: IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
    addr: SocketAddr,
) -> Result<()> {
    let tls_config = RustlsConfig::from_pem_file(
        std::env::var("DEV_CERT_LOCATION").context("DEV_CERT_LOCATION must be set")?,
        std::env::var("DEV_KEY_LOCATION").context("DEV_KEY_LOCATION must be set")?,
    )
    .await
    .context("failed to load TLS certs")?;

    info!(%addr, "running with TLS");
    axum_server::bind_rustls(addr, tls_config)
        .serve(make_service)
        .await
        .context("server error")
}

#[cfg(not(feature = "tls"))]
async fn serve(
    make_service: IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
    addr: SocketAddr,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "running without TLS");
    axum::serve(listener, make_service)
        .await
        .context("server error")
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("successfully connected to the database");
    Ok(pool)
}
