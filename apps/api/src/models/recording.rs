use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const RECORDING_IN_PROGRESS: &str = "recording";
pub const RECORDING_COMPLETE: &str = "complete";
pub const RECORDING_FAILED: &str = "failed";
pub const RECORDING_UPLOADED: &str = "uploaded";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub interview_id: Option<Uuid>,
    pub egress_id: Option<String>,
    pub room_name: Option<String>,
    pub storage_key: Option<String>,
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub duration_ms: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
