use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const PROVIDER_GOOGLE: &str = "google";

/// OAuth credentials for a third-party provider. Never serialized to clients.
#[derive(Debug, Clone, FromRow)]
pub struct IntegrationTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationTokenRow {
    /// True when the access token expires within `skew`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .map(|expires| expires <= now + skew)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub connected: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: Option<DateTime<Utc>>) -> IntegrationTokenRow {
        IntegrationTokenRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: PROVIDER_GOOGLE.to_string(),
            access_token: "ya29".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at,
            scope: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_needs_refresh_within_skew() {
        let now = Utc::now();
        assert!(token(Some(now + Duration::seconds(30))).needs_refresh(now, Duration::seconds(60)));
        assert!(!token(Some(now + Duration::minutes(30))).needs_refresh(now, Duration::seconds(60)));
        assert!(!token(None).needs_refresh(now, Duration::seconds(60)));
    }
}
