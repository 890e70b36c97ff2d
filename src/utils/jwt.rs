use std::collections::HashSet;

use jsonwebtoken::{
    decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use thiserror::Error;

use crate::routes::auth::claims::Claims;

/// Minimum acceptable size for the JWT secret in bytes.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;
/// Minimum number of unique bytes expected for the JWT secret to avoid trivially guessable values.
const MIN_UNIQUE_JWT_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be at least {required} bytes, but {actual} bytes were provided")]
    TooShort { actual: usize, required: usize },
    #[error(
        "JWT_SECRET must contain sufficient entropy (at least {required} unique bytes); only {actual} unique bytes found"
    )]
    LowEntropy { actual: usize, required: usize },
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, JwtSecretError> {
        let bytes = secret.as_ref();
        validate_secret(bytes)?;

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Implemented by router state so the auth extractor can validate tokens
/// without knowing the concrete state type.
pub trait JwtKeyProvider {
    fn jwt_keys(&self) -> &JwtKeys;
    fn jwt_audience(&self) -> &str;
    fn jwt_issuer(&self) -> Option<&str>;
}

fn validate_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(JwtSecretError::TooShort {
            actual: secret.len(),
            required: MIN_JWT_SECRET_LENGTH,
        });
    }

    let unique = secret.iter().copied().collect::<HashSet<_>>().len();
    if unique < MIN_UNIQUE_JWT_BYTES {
        return Err(JwtSecretError::LowEntropy {
            actual: unique,
            required: MIN_UNIQUE_JWT_BYTES,
        });
    }

    Ok(())
}

pub fn create_jwt(claims: &Claims, keys: &JwtKeys) -> Result<String, Error> {
    encode(&Header::default(), claims, keys.encoding_key())
}

pub fn decode_jwt(
    token: &str,
    keys: &JwtKeys,
    audience: &str,
    issuer: Option<&str>,
) -> Result<TokenData<Claims>, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);
    decode::<Claims>(token, keys.decoding_key(), &validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn valid_secret() -> &'static str {
        "0123456789abcdef0123456789abcdef"
    }

    fn claims(exp_offset: i64, aud: &str, iss: Option<&str>) -> Claims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        Claims {
            sub: "7f1c2a52-8a8f-4a53-9a53-7b0f0e0c2b11".into(),
            email: Some("aspirant@example.com".into()),
            role: Some("authenticated".into()),
            exp: (now + exp_offset) as usize,
            aud: aud.into(),
            iss: iss.map(str::to_string),
        }
    }

    #[test]
    fn rejects_short_secret() {
        let err = JwtKeys::from_secret("too-short").unwrap_err();
        assert!(matches!(
            err,
            JwtSecretError::TooShort {
                actual,
                required: MIN_JWT_SECRET_LENGTH
            } if actual < MIN_JWT_SECRET_LENGTH
        ));
    }

    #[test]
    fn rejects_low_entropy_secret() {
        let err = JwtKeys::from_secret("a".repeat(MIN_JWT_SECRET_LENGTH)).unwrap_err();
        assert!(matches!(err, JwtSecretError::LowEntropy { .. }));
    }

    #[test]
    fn accepts_token_for_configured_audience() {
        let keys = JwtKeys::from_secret(valid_secret()).unwrap();
        let token = create_jwt(&claims(60, "authenticated", None), &keys).unwrap();
        let decoded = decode_jwt(&token, &keys, "authenticated", None).unwrap();
        assert_eq!(
            decoded.claims.email.as_deref(),
            Some("aspirant@example.com")
        );
    }

    #[test]
    fn rejects_wrong_audience_and_issuer() {
        let keys = JwtKeys::from_secret(valid_secret()).unwrap();
        let token = create_jwt(&claims(60, "other-app", Some("auth")), &keys).unwrap();
        assert!(decode_jwt(&token, &keys, "authenticated", None).is_err());

        let token = create_jwt(&claims(60, "authenticated", Some("auth")), &keys).unwrap();
        assert!(decode_jwt(&token, &keys, "authenticated", Some("auth")).is_ok());
        assert!(decode_jwt(&token, &keys, "authenticated", Some("someone-else")).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let keys = JwtKeys::from_secret(valid_secret()).unwrap();
        let token = create_jwt(&claims(-3600, "authenticated", None), &keys).unwrap();
        assert!(decode_jwt(&token, &keys, "authenticated", None).is_err());
    }
}
