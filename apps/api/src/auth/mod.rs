//! Session lookup for protected routes.
//!
//! Sessions are issued by the external auth service and stored in the shared
//! `sessions` table. This module only resolves a presented token to a user;
//! it never creates or refreshes sessions.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use sqlx::PgPool;
use tracing::debug;

use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

const SESSION_COOKIES: [&str; 2] = [
    "better-auth.session_token",
    "__Secure-better-auth.session_token",
];

/// Extractor for any signed-in user. Rejects with 401 before touching
/// anything else when no valid session is presented.
pub struct AuthUser(pub User);

/// Extractor for users with the `admin` role. 401 without a session, 403
/// for non-admins.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let user = find_session_user(&state.db, &token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(AuthUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// Pulls the session token from `Authorization: Bearer` or the auth cookie.
/// Cookie values are `<token>.<signature>`; only the token part is looked up.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| SESSION_COOKIES.contains(name))
        .map(|(_, value)| value.split('.').next().unwrap_or(value).to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves an unexpired session token to its user.
pub async fn find_session_user(pool: &PgPool, token: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token = $1 AND s.expires_at > now()
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    if user.is_none() {
        debug!("Session token not found or expired");
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cookie_token_strips_signature() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; better-auth.session_token=tok456.sig789"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok456"));
    }

    #[test]
    fn test_secure_cookie_name() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("__Secure-better-auth.session_token=tok"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn test_missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(session_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(session_token(&headers).is_none());
    }
}
