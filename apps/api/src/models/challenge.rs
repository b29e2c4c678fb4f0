use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChallengeExample {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StarterCode {
    pub javascript: Option<String>,
    pub python: Option<String>,
    pub java: Option<String>,
    pub cpp: Option<String>,
    pub typescript: Option<String>,
    pub go: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRow {
    pub id: Uuid,
    pub title: String,
    pub difficulty: String,
    pub description: String,
    pub constraints: Vec<String>,
    pub examples: Json<Vec<ChallengeExample>>,
    pub test_cases: Json<Vec<TestCase>>,
    pub time_limit: i32,
    pub memory_limit: i32,
    pub category: String,
    pub tags: Vec<String>,
    pub hints: Vec<String>,
    pub starter_code: Json<StarterCode>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub challenge_id: Option<Uuid>,
    pub language: String,
    pub code: String,
    pub passed_tests: i32,
    pub total_tests: i32,
    pub execution_time: Option<f64>,
    pub memory_used: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
