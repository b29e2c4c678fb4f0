use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::challenge::{ChallengeExample, ChallengeRow, StarterCode, SubmissionRow, TestCase};

const CHALLENGE_COLUMNS: &str = "id, title, difficulty, description, constraints, examples, \
     test_cases, time_limit, memory_limit, category, tags, hints, starter_code, created_by, created_at";

#[derive(Debug, Default, Deserialize)]
pub struct ChallengeFilter {
    pub difficulty: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ChallengeFilter {
    pub fn page(&self) -> (i64, i64) {
        (
            self.limit.unwrap_or(10).clamp(1, 100),
            self.offset.unwrap_or(0).max(0),
        )
    }
}

/// A challenge ready to be stored. Missing fields already carry defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChallenge {
    pub title: String,
    pub difficulty: String,
    pub description: String,
    pub constraints: Vec<String>,
    pub examples: Vec<ChallengeExample>,
    pub test_cases: Vec<TestCase>,
    pub time_limit: i32,
    pub memory_limit: i32,
    pub category: String,
    pub tags: Vec<String>,
    pub hints: Vec<String>,
    pub starter_code: StarterCode,
}

/// Filtered page plus the unpaged match count.
pub async fn list_challenges(
    pool: &PgPool,
    filter: &ChallengeFilter,
) -> Result<(Vec<ChallengeRow>, i64), AppError> {
    let (limit, offset) = filter.page();
    let rows = sqlx::query_as::<_, ChallengeRow>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM code_challenges
         WHERE ($1::text IS NULL OR lower(difficulty) = lower($1))
           AND ($2::text IS NULL OR category = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4"
    ))
    .bind(&filter.difficulty)
    .bind(&filter.category)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM code_challenges
         WHERE ($1::text IS NULL OR lower(difficulty) = lower($1))
           AND ($2::text IS NULL OR category = $2)",
    )
    .bind(&filter.difficulty)
    .bind(&filter.category)
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

pub async fn get_challenge(pool: &PgPool, id: Uuid) -> Result<ChallengeRow, AppError> {
    sqlx::query_as::<_, ChallengeRow>(&format!(
        "SELECT {CHALLENGE_COLUMNS} FROM code_challenges WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Challenge not found".to_string()))
}

pub async fn insert_challenge(
    pool: &PgPool,
    created_by: Option<Uuid>,
    challenge: NewChallenge,
) -> Result<ChallengeRow, AppError> {
    let row = sqlx::query_as::<_, ChallengeRow>(&format!(
        "INSERT INTO code_challenges
            (title, difficulty, description, constraints, examples, test_cases,
             time_limit, memory_limit, category, tags, hints, starter_code, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         RETURNING {CHALLENGE_COLUMNS}"
    ))
    .bind(challenge.title)
    .bind(challenge.difficulty)
    .bind(challenge.description)
    .bind(challenge.constraints)
    .bind(Json(challenge.examples))
    .bind(Json(challenge.test_cases))
    .bind(challenge.time_limit)
    .bind(challenge.memory_limit)
    .bind(challenge.category)
    .bind(challenge.tags)
    .bind(challenge.hints)
    .bind(Json(challenge.starter_code))
    .bind(created_by)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFilter {
    pub challenge_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub struct NewSubmission {
    pub challenge_id: Option<Uuid>,
    pub language: String,
    pub code: String,
    pub passed_tests: i32,
    pub total_tests: i32,
    pub execution_time: Option<f64>,
    pub memory_used: Option<f64>,
    pub status: String,
}

pub async fn list_submissions(
    pool: &PgPool,
    user_id: Uuid,
    filter: &SubmissionFilter,
) -> Result<(Vec<SubmissionRow>, i64), AppError> {
    let limit = filter.limit.unwrap_or(10).clamp(1, 100);
    let offset = filter.offset.unwrap_or(0).max(0);
    let rows = sqlx::query_as::<_, SubmissionRow>(
        "SELECT id, user_id, challenge_id, language, code, passed_tests, total_tests,
                execution_time, memory_used, status, created_at
         FROM code_submissions
         WHERE user_id = $1 AND ($2::uuid IS NULL OR challenge_id = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(filter.challenge_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM code_submissions
         WHERE user_id = $1 AND ($2::uuid IS NULL OR challenge_id = $2)",
    )
    .bind(user_id)
    .bind(filter.challenge_id)
    .fetch_one(pool)
    .await?;

    Ok((rows, total))
}

pub async fn insert_submission(
    pool: &PgPool,
    user_id: Uuid,
    submission: NewSubmission,
) -> Result<SubmissionRow, AppError> {
    let row = sqlx::query_as::<_, SubmissionRow>(
        "INSERT INTO code_submissions
            (user_id, challenge_id, language, code, passed_tests, total_tests,
             execution_time, memory_used, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id, user_id, challenge_id, language, code, passed_tests, total_tests,
                   execution_time, memory_used, status, created_at",
    )
    .bind(user_id)
    .bind(submission.challenge_id)
    .bind(submission.language)
    .bind(submission.code)
    .bind(submission.passed_tests)
    .bind(submission.total_tests)
    .bind(submission.execution_time)
    .bind(submission.memory_used)
    .bind(submission.status)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_page_defaults_and_bounds() {
        assert_eq!(ChallengeFilter::default().page(), (10, 0));
        let filter = ChallengeFilter {
            limit: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(filter.page(), (100, 0));
    }

    #[test]
    fn test_submission_filter_query_names() {
        let filter: SubmissionFilter = serde_json::from_value(serde_json::json!({
            "challengeId": "4f9d5a3c-1b2e-4c1a-9a57-0d6c2b8f1e11",
            "limit": 5
        }))
        .unwrap();
        assert!(filter.challenge_id.is_some());
        assert_eq!(filter.limit, Some(5));
    }
}
