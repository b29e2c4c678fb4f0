//! LiveKit access tokens: HS256 JWTs signed with the API secret.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::LiveKitConfig;

/// Participant tokens live for 24 hours.
pub const PARTICIPANT_TTL_SECS: i64 = 24 * 60 * 60;
/// Server-side tokens used against the Egress API.
pub const SERVICE_TTL_SECS: i64 = 10 * 60;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid token format")]
    Format,

    #[error("token fetch failed: {0}")]
    Fetch(String),

    #[error("webhook body digest mismatch")]
    DigestMismatch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_record: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub video: VideoGrant,
    /// Set on webhook tokens: base64 SHA-256 of the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Clone)]
pub struct TokenMinter {
    api_key: String,
    api_secret: String,
}

impl TokenMinter {
    pub fn new(config: &LiveKitConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    /// Token that lets `identity` join `room` with publish/subscribe/data rights.
    pub fn participant_token(
        &self,
        room: &str,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<String, TokenError> {
        let grant = VideoGrant {
            room_join: true,
            room: room.to_string(),
            can_publish: Some(true),
            can_subscribe: Some(true),
            can_publish_data: Some(true),
            ..Default::default()
        };
        self.sign(identity, display_name, grant, PARTICIPANT_TTL_SECS)
    }

    /// Token for the Egress API; carries `roomRecord` only.
    pub fn recorder_token(&self, room: &str) -> Result<String, TokenError> {
        let grant = VideoGrant {
            room: room.to_string(),
            room_record: true,
            ..Default::default()
        };
        self.sign("jobprep-recorder", None, grant, SERVICE_TTL_SECS)
    }

    fn sign(
        &self,
        identity: &str,
        name: Option<&str>,
        video: VideoGrant,
        ttl: i64,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + ttl,
            name: name.map(str::to_string),
            video,
            sha256: None,
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?)
    }

    /// Checks a webhook `Authorization` token: signature, issuer and the
    /// body digest claim.
    pub fn verify_webhook(&self, token: &str, body: &[u8]) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.api_key.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.api_secret.as_bytes()),
            &validation,
        )?;

        let digest = STANDARD.encode(Sha256::digest(body));
        match data.claims.sha256.as_deref() {
            Some(claimed) if claimed == digest => Ok(data.claims),
            _ => Err(TokenError::DigestMismatch),
        }
    }
}

#[derive(Deserialize)]
struct ExpOnly {
    exp: i64,
}

/// Reads `exp` from a JWT payload without verifying the signature.
pub fn decode_expiry(token: &str) -> Result<i64, TokenError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Format);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenError::Format)?;
    let claims: ExpOnly = serde_json::from_slice(&bytes).map_err(|_| TokenError::Format)?;
    Ok(claims.exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> TokenMinter {
        TokenMinter::new(&LiveKitConfig {
            url: "wss://example.livekit.cloud".into(),
            api_key: "APIkey".into(),
            api_secret: "livekit-secret-livekit-secret-123".into(),
        })
    }

    fn webhook_token(m: &TokenMinter, digest: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: m.api_key.clone(),
            sub: String::new(),
            nbf: now,
            exp: now + 300,
            name: None,
            video: VideoGrant::default(),
            sha256: Some(digest.to_string()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(m.api_secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_participant_token_claims() {
        let token = minter()
            .participant_token("interview-42", "alice", Some("Alice"))
            .unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["APIkey"]);
        let claims = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"livekit-secret-livekit-secret-123"),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.nbf, PARTICIPANT_TTL_SECS);
        assert!(claims.video.room_join);
        assert_eq!(claims.video.room, "interview-42");
        assert_eq!(claims.video.can_publish_data, Some(true));
        assert!(!claims.video.room_record);
    }

    #[test]
    fn test_decode_expiry() {
        let token = minter().participant_token("room", "bob", None).unwrap();
        let exp = decode_expiry(&token).unwrap();
        assert!(exp > Utc::now().timestamp() + PARTICIPANT_TTL_SECS - 5);

        assert!(matches!(decode_expiry("not-a-jwt"), Err(TokenError::Format)));
        assert!(matches!(decode_expiry("a.%%%.c"), Err(TokenError::Format)));
    }

    #[test]
    fn test_webhook_verification() {
        let m = minter();
        let body = br#"{"event":"egress_ended"}"#;
        let digest = STANDARD.encode(Sha256::digest(body));

        let token = webhook_token(&m, &digest);
        assert!(m.verify_webhook(&token, body).is_ok());
        assert!(matches!(
            m.verify_webhook(&token, b"{}"),
            Err(TokenError::DigestMismatch)
        ));

        let other = TokenMinter {
            api_key: "APIkey".into(),
            api_secret: "another-secret-another-secret-99".into(),
        };
        assert!(matches!(
            other.verify_webhook(&token, body),
            Err(TokenError::Jwt(_))
        ));
    }
}
