use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::{LiveKitConfig, StorageConfig};
use crate::livekit::cache::{RecorderTokenSource, TokenCache};
use crate::livekit::token::TokenMinter;

#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Egress API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("token error: {0}")]
    Token(#[from] crate::livekit::token::TokenError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressInfo {
    #[serde(alias = "egressId")]
    pub egress_id: String,
    #[serde(default, alias = "roomName")]
    pub room_name: Option<String>,
    #[serde(default)]
    pub status: Option<Value>,
}

/// Talks to the LiveKit server: participant tokens and the Egress Twirp API.
#[derive(Clone)]
pub struct LiveKitService {
    http: Client,
    api_url: String,
    ws_url: String,
    minter: TokenMinter,
    recorder_tokens: Arc<TokenCache>,
    storage: Option<StorageConfig>,
}

/// `wss://host` → `https://host`; LiveKit serves its HTTP API on the same origin.
pub fn http_base_url(ws_url: &str) -> String {
    let trimmed = ws_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        trimmed.to_string()
    }
}

impl LiveKitService {
    pub fn new(config: &LiveKitConfig, storage: Option<StorageConfig>) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let minter = TokenMinter::new(config);
        let recorder_tokens = Arc::new(TokenCache::new(Arc::new(RecorderTokenSource::new(
            minter.clone(),
        ))));
        Ok(Self {
            http,
            api_url: http_base_url(&config.url),
            ws_url: config.url.clone(),
            minter,
            recorder_tokens,
            storage,
        })
    }

    pub fn minter(&self) -> &TokenMinter {
        &self.minter
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Starts a composite MP4 recording of `room`. Output goes to the
    /// configured S3 bucket when there is one, otherwise to the server default.
    pub async fn start_room_recording(&self, room: &str) -> Result<EgressInfo, EgressError> {
        let filepath = format!("recordings/{room}-{}.mp4", Utc::now().timestamp());
        let mut file_output = json!({
            "fileType": "MP4",
            "filepath": filepath,
        });
        if let Some(s3) = &self.storage {
            file_output["s3"] = json!({
                "accessKey": s3.access_key_id,
                "secret": s3.secret_access_key,
                "region": s3.region,
                "bucket": s3.bucket,
                "endpoint": s3.endpoint.clone().unwrap_or_default(),
                "forcePathStyle": s3.endpoint.is_some(),
            });
        }

        let body = json!({
            "roomName": room,
            "layout": "speaker",
            "fileOutputs": [file_output],
        });
        let info: EgressInfo = self
            .twirp(room, "StartRoomCompositeEgress", &body)
            .await?;
        info!("Started egress {} for room {room}", info.egress_id);
        Ok(info)
    }

    pub async fn stop_recording(&self, room: &str, egress_id: &str) -> Result<EgressInfo, EgressError> {
        let info: EgressInfo = self
            .twirp(room, "StopEgress", &json!({ "egressId": egress_id }))
            .await?;
        info!("Stopped egress {egress_id}");
        Ok(info)
    }

    async fn twirp<T: serde::de::DeserializeOwned>(
        &self,
        room: &str,
        method: &str,
        body: &Value,
    ) -> Result<T, EgressError> {
        let token = self.recorder_tokens.get_token(room).await?;
        let url = format!("{}/twirp/livekit.Egress/{method}", self.api_url);
        debug!("POST {url}");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            error!("Egress {method} returned {status}: {message}");
            return Err(EgressError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base_url() {
        assert_eq!(
            http_base_url("wss://demo.livekit.cloud/"),
            "https://demo.livekit.cloud"
        );
        assert_eq!(http_base_url("ws://localhost:7880"), "http://localhost:7880");
        assert_eq!(http_base_url("https://lk.example.com"), "https://lk.example.com");
    }

    #[test]
    fn test_egress_info_accepts_both_casings() {
        let a: EgressInfo = serde_json::from_value(json!({ "egressId": "EG_1" })).unwrap();
        let b: EgressInfo = serde_json::from_value(json!({ "egress_id": "EG_2" })).unwrap();
        assert_eq!(a.egress_id, "EG_1");
        assert_eq!(b.egress_id, "EG_2");
    }
}
