use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InterviewAnalyticsRow {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub speech_clarity: Option<f64>,
    pub speech_pace: Option<f64>,
    pub filler_words: Option<i32>,
    pub confidence: Option<f64>,
    pub eye_contact: Option<f64>,
    pub facial_expressions: Option<Value>,
    pub body_language: Option<Value>,
    pub response_time: Option<f64>,
    pub accuracy_score: Option<f64>,
    pub problem_solving_score: Option<f64>,
    pub attention: Option<f64>,
    pub participation: Option<f64>,
    pub analysis_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}
