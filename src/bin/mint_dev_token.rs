use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use upsc_prep_backend::config::DEFAULT_JWT_AUDIENCE;
use upsc_prep_backend::routes::auth::claims::Claims;
use upsc_prep_backend::utils::jwt::{create_jwt, JwtKeys};

const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Prints a signed access token for local testing.
///
/// Usage: `mint-dev-token <user-uuid> [email] [ttl-seconds]`
fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = env::args().skip(1);
    let user_id = match args.next() {
        Some(raw) => Uuid::parse_str(&raw).context("first argument must be a user UUID")?,
        None => bail!("usage: mint-dev-token <user-uuid> [email] [ttl-seconds]"),
    };
    let email = args.next();
    let ttl = match args.next() {
        Some(raw) => raw.parse::<u64>().context("ttl-seconds must be an integer")?,
        None => DEFAULT_TTL_SECONDS,
    };

    let secret = env::var("JWT_SECRET").context("JWT_SECRET is required to mint a token")?;
    let keys = JwtKeys::from_secret(secret).context("JWT_SECRET rejected")?;
    let audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| DEFAULT_JWT_AUDIENCE.to_string());

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before UNIX epoch")?
        .as_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        email,
        role: Some("authenticated".to_string()),
        exp: (now + ttl) as usize,
        aud: audience,
        iss: env::var("JWT_ISSUER").ok().filter(|v| !v.trim().is_empty()),
    };

    let token = create_jwt(&claims, &keys).context("failed to sign token")?;
    println!("{token}");
    Ok(())
}
