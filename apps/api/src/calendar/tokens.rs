use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::calendar::google::{GoogleCalendarClient, OAuthTokens};
use crate::errors::AppError;
use crate::models::integration::{IntegrationTokenRow, PROVIDER_GOOGLE};

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_SKEW_SECS: i64 = 60;

pub async fn find_google_token(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<IntegrationTokenRow>, AppError> {
    Ok(sqlx::query_as::<_, IntegrationTokenRow>(
        "SELECT * FROM integration_tokens WHERE user_id = $1 AND provider = $2",
    )
    .bind(user_id)
    .bind(PROVIDER_GOOGLE)
    .fetch_optional(pool)
    .await?)
}

/// Inserts or replaces the user's Google credentials. A refresh token missing
/// from the new grant keeps the stored one.
pub async fn store_google_tokens(
    pool: &PgPool,
    user_id: Uuid,
    tokens: &OAuthTokens,
) -> Result<IntegrationTokenRow, AppError> {
    let expires_at = tokens
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs));

    Ok(sqlx::query_as::<_, IntegrationTokenRow>(
        r#"
        INSERT INTO integration_tokens (user_id, provider, access_token, refresh_token, expires_at, scope)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id, provider) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = COALESCE(EXCLUDED.refresh_token, integration_tokens.refresh_token),
            expires_at = EXCLUDED.expires_at,
            scope = COALESCE(EXCLUDED.scope, integration_tokens.scope),
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(PROVIDER_GOOGLE)
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(expires_at)
    .bind(&tokens.scope)
    .fetch_one(pool)
    .await?)
}

/// A usable access token for the user, refreshing it when close to expiry.
pub async fn google_access_token(
    pool: &PgPool,
    client: &GoogleCalendarClient,
    user_id: Uuid,
) -> Result<String, AppError> {
    let row = find_google_token(pool, user_id)
        .await?
        .ok_or_else(|| AppError::Validation("Google Calendar not connected".to_string()))?;

    if !row.needs_refresh(Utc::now(), Duration::seconds(REFRESH_SKEW_SECS)) {
        return Ok(row.access_token);
    }

    let refresh_token = row.refresh_token.as_deref().ok_or_else(|| {
        AppError::Validation("Google Calendar authorization expired; reconnect".to_string())
    })?;
    let fresh = client
        .refresh(refresh_token)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;
    store_google_tokens(pool, user_id, &fresh).await?;
    info!("Refreshed Google access token for user {user_id}");
    Ok(fresh.access_token)
}
