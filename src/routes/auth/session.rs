use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::routes::auth::claims::Claims;
use crate::utils::jwt::{decode_jwt, JwtKeyProvider};

pub const AUTH_COOKIE: &str = "auth_token";

/// Authenticated caller. Handlers take the principal from here and pass it on
/// explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub claims: Claims,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingToken,
    InvalidToken,
    InvalidSubject,
}

impl AuthRejection {
    pub fn message(&self) -> &'static str {
        match self {
            AuthRejection::MissingToken => "Authentication required",
            AuthRejection::InvalidToken => "Invalid or expired token",
            AuthRejection::InvalidSubject => "Token subject is not a valid user id",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        JsonResponse::unauthorized(self.message()).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: JwtKeyProvider + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(token) => token,
            None => {
                let jar = CookieJar::from_headers(&parts.headers);
                jar.get(AUTH_COOKIE)
                    .map(|cookie| cookie.value().to_string())
                    .ok_or(AuthRejection::MissingToken)?
            }
        };

        let claims = decode_jwt(
            &token,
            state.jwt_keys(),
            state.jwt_audience(),
            state.jwt_issuer(),
        )
        .map_err(|_| AuthRejection::InvalidToken)?
        .claims;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthRejection::InvalidSubject)?;

        Ok(AuthSession { user_id, claims })
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::FromRequestParts,
        http::{header, Method, Request, StatusCode},
        response::IntoResponse,
    };
    use axum_extra::extract::cookie::Cookie;
    use uuid::Uuid;

    use super::{AuthRejection, AuthSession, AUTH_COOKIE};
    use crate::db::mock_db::MockDb;
    use crate::state::test_support::{bearer_for, test_state};

    async fn extract(request: Request<()>) -> Result<AuthSession, AuthRejection> {
        let state = test_state(MockDb::new(), None);
        let mut parts = request.into_parts().0;
        AuthSession::from_request_parts(&mut parts, &state).await
    }

    #[tokio::test]
    async fn test_bearer_token_extracted() {
        let user_id = Uuid::new_v4();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/entitlements/check")
            .header(header::AUTHORIZATION, bearer_for(user_id))
            .body(())
            .unwrap();

        let session = extract(request).await.unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.claims.email.as_deref(), Some("aspirant@example.com"));
    }

    #[tokio::test]
    async fn test_cookie_fallback() {
        let user_id = Uuid::new_v4();
        let token = bearer_for(user_id).trim_start_matches("Bearer ").to_string();
        let cookie = Cookie::new(AUTH_COOKIE, token);
        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, cookie.to_string())
            .body(())
            .unwrap();

        assert_eq!(extract(request).await.unwrap().user_id, user_id);
    }

    #[tokio::test]
    async fn test_missing_token_returns_unauthorized() {
        let request = Request::builder().uri("/").body(()).unwrap();
        let rejection = extract(request).await.unwrap_err();
        assert_eq!(rejection, AuthRejection::MissingToken);
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_returns_unauthorized() {
        let request = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Bearer invalid.token.here")
            .body(())
            .unwrap();
        assert_eq!(
            extract(request).await.unwrap_err(),
            AuthRejection::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_ignored() {
        let request = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        assert_eq!(
            extract(request).await.unwrap_err(),
            AuthRejection::MissingToken
        );
    }
}
