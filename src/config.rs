use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::models::plan::DEFAULT_FREE_DAILY_LIMIT;
use crate::utils::jwt::{JwtKeys, JwtSecretError};

pub const DEFAULT_JWT_AUDIENCE: &str = "authenticated";
pub const DEFAULT_UPGRADE_CTA: &str = "Upgrade to Pro for unlimited access";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Jwt(#[from] JwtSecretError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub per_millisecond: u64,
    pub burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub jwt_keys: JwtKeys,
    pub jwt_audience: String,
    pub jwt_issuer: Option<String>,
    /// `None` leaves the billing webhook unauthenticated (development only).
    pub billing_webhook_secret: Option<String>,
    pub upgrade_cta: String,
    pub free_daily_limit: i32,
    pub rate_limit: RateLimitSettings,
    pub log_format: LogFormat,
    pub run_migrations: bool,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse::<T>().map_err(|err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = required("DATABASE_URL")?;
        let frontend_origin = required("FRONTEND_ORIGIN")?;
        let jwt_keys = JwtKeys::from_secret(required("JWT_SECRET")?)?;

        let free_daily_limit: i32 = parsed("FREE_DAILY_LIMIT", DEFAULT_FREE_DAILY_LIMIT)?;
        if free_daily_limit < 0 {
            return Err(ConfigError::Invalid {
                name: "FREE_DAILY_LIMIT",
                reason: "must not be negative".into(),
            });
        }

        let log_format = match optional("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected `json` or `pretty`, got `{other}`"),
                })
            }
        };

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            jwt_keys,
            jwt_audience: optional("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_JWT_AUDIENCE.into()),
            jwt_issuer: optional("JWT_ISSUER"),
            billing_webhook_secret: optional("BILLING_WEBHOOK_SECRET"),
            upgrade_cta: optional("UPGRADE_CTA").unwrap_or_else(|| DEFAULT_UPGRADE_CTA.into()),
            free_daily_limit,
            rate_limit: RateLimitSettings {
                // Default: 200ms/token (~5 req/sec)
                per_millisecond: parsed("RATE_LIMITER_MILLISECONDS", 200)?,
                burst: parsed("RATE_LIMITER_BURST", 20)?,
            },
            log_format,
            run_migrations: parsed("RUN_MIGRATIONS", true)?,
        })
    }

    pub fn webhook_signature_enabled(&self) -> bool {
        self.billing_webhook_secret.is_some()
    }
}
