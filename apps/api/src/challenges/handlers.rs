use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::billing::plans::LimitKind;
use crate::billing::usage::require_limit;
use crate::challenges::prompts::{CHALLENGE_PROMPT, CHALLENGE_SYSTEM};
use crate::challenges::runner::{metrics, run_test_cases, ExecutionMetrics, Language, Limits, TestResult};
use crate::challenges::skills::{
    default_starter_code, experience_summary, extract_skills, matching_skills,
};
use crate::challenges::store::{
    get_challenge, insert_challenge, insert_submission, list_challenges, list_submissions,
    ChallengeFilter, NewChallenge, NewSubmission, SubmissionFilter,
};
use crate::errors::AppError;
use crate::llm_client::prompts::render;
use crate::models::challenge::{ChallengeExample, ChallengeRow, StarterCode, SubmissionRow, TestCase};
use crate::state::AppState;

pub const MAX_CODE_BYTES: usize = 50 * 1024;
const MAX_GENERATED: i64 = 5;

pub const STATUS_ACCEPTED: &str = "ACCEPTED";
pub const STATUS_WRONG_ANSWER: &str = "WRONG_ANSWER";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeList {
    pub challenges: Vec<ChallengeRow>,
    pub total: i64,
    pub has_more: bool,
}

/// GET /api/challenges
pub async fn handle_list(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(filter): Query<ChallengeFilter>,
) -> Result<Json<ChallengeList>, AppError> {
    let (limit, offset) = filter.page();
    let (challenges, total) = list_challenges(&state.db, &filter).await?;
    let has_more = offset + limit < total;
    Ok(Json(ChallengeList {
        challenges,
        total,
        has_more,
    }))
}

/// GET /api/challenges/:id
pub async fn handle_get(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeRow>, AppError> {
    Ok(Json(get_challenge(&state.db, id).await?))
}

/// Challenge fields as sent by admins and as produced by the model.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeInput {
    pub title: Option<String>,
    pub difficulty: Option<String>,
    pub description: Option<String>,
    pub constraints: Option<Vec<String>>,
    pub examples: Option<Vec<ChallengeExample>>,
    pub test_cases: Option<Vec<TestCase>>,
    pub time_limit: Option<f64>,
    pub memory_limit: Option<f64>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub hints: Option<Vec<String>>,
    pub starter_code: Option<StarterCode>,
}

/// Maps any casing of easy/medium/hard onto the stored form.
pub fn normalize_difficulty(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "easy" => Some("Easy"),
        "medium" => Some("Medium"),
        "hard" => Some("Hard"),
        _ => None,
    }
}

impl ChallengeInput {
    /// Fills every gap with its default. Used for generated challenges,
    /// where the model may omit anything.
    pub fn with_defaults(self, fallback_difficulty: &str) -> NewChallenge {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled Challenge".to_string());
        let starter_code = self
            .starter_code
            .unwrap_or_else(|| default_starter_code(&title));
        NewChallenge {
            difficulty: self
                .difficulty
                .as_deref()
                .and_then(normalize_difficulty)
                .unwrap_or(fallback_difficulty)
                .to_string(),
            description: self.description.unwrap_or_default(),
            constraints: self.constraints.unwrap_or_default(),
            examples: self.examples.unwrap_or_default(),
            test_cases: self.test_cases.unwrap_or_default(),
            time_limit: self
                .time_limit
                .filter(|t| *t > 0.0)
                .map(|t| t.round() as i32)
                .unwrap_or(1000),
            memory_limit: self
                .memory_limit
                .filter(|m| *m > 0.0)
                .map(|m| m.round() as i32)
                .unwrap_or(256),
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "General".to_string()),
            tags: self.tags.unwrap_or_default(),
            hints: self.hints.unwrap_or_default(),
            starter_code,
            title,
        }
    }

    /// Admin-authored challenges must name title, difficulty, description
    /// and at least one test case.
    pub fn validated(self) -> Result<NewChallenge, AppError> {
        let missing = self.title.as_deref().map_or(true, |t| t.trim().is_empty())
            || self.description.as_deref().map_or(true, |d| d.trim().is_empty())
            || self.test_cases.as_ref().map_or(true, Vec::is_empty);
        if missing {
            return Err(AppError::Validation("Missing required fields".to_string()));
        }
        let difficulty = self
            .difficulty
            .as_deref()
            .and_then(normalize_difficulty)
            .ok_or_else(|| {
                AppError::Validation("Difficulty must be Easy, Medium or Hard".to_string())
            })?;
        Ok(self.with_defaults(difficulty))
    }
}

/// POST /api/challenges
pub async fn handle_create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(input): Json<ChallengeInput>,
) -> Result<(StatusCode, Json<ChallengeRow>), AppError> {
    let challenge = input.validated()?;
    let row = insert_challenge(&state.db, Some(admin.id), challenge).await?;
    info!("Admin {} created challenge {}", admin.id, row.id);
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChallengesRequest {
    pub cv_data: Option<Value>,
    pub job_description: Option<String>,
    pub difficulty: Option<String>,
    pub count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GeneratedChallenges {
    #[serde(default)]
    challenges: Vec<ChallengeInput>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub cv_skills: Vec<String>,
    pub job_skills: Vec<String>,
    pub matching_skills: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct GenerateChallengesResponse {
    pub success: bool,
    pub challenges: Vec<ChallengeRow>,
    pub metadata: GenerationMetadata,
}

/// Validated generation inputs and the rendered prompt.
pub struct GenerationPlan {
    pub difficulty: &'static str,
    pub count: i64,
    pub prompt: String,
    pub cv_skills: Vec<String>,
    pub job_skills: Vec<String>,
    pub matching_skills: Vec<String>,
}

pub fn plan_generation(req: GenerateChallengesRequest) -> Result<GenerationPlan, AppError> {
    let (Some(cv), Some(job)) = (
        req.cv_data.filter(|v| !v.is_null()),
        req.job_description.filter(|j| !j.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(
            "CV data and job description are required".to_string(),
        ));
    };
    let difficulty = req
        .difficulty
        .as_deref()
        .map(|d| {
            normalize_difficulty(d).ok_or_else(|| {
                AppError::Validation("Difficulty must be Easy, Medium or Hard".to_string())
            })
        })
        .transpose()?
        .unwrap_or("Medium");
    let count = req.count.unwrap_or(3).clamp(1, MAX_GENERATED);

    let cv_skills = extract_skills(&cv);
    let job_skills = extract_skills(&Value::String(job.clone()));
    let matching = matching_skills(&cv_skills, &job_skills);

    let count_text = count.to_string();
    let cv_text = cv_skills.join(", ");
    let job_text = job_skills.join(", ");
    let matching_text = if matching.is_empty() {
        "general programming".to_string()
    } else {
        matching.join(", ")
    };
    let experience = experience_summary(&cv);
    let job_excerpt: String = job.chars().take(500).collect();
    let prompt = render(
        CHALLENGE_PROMPT,
        &[
            ("count", &count_text),
            ("cv_skills", &cv_text),
            ("job_skills", &job_text),
            ("matching_skills", &matching_text),
            ("difficulty", difficulty),
            ("experience", &experience),
            ("job", &job_excerpt),
        ],
    );

    Ok(GenerationPlan {
        difficulty,
        count,
        prompt,
        cv_skills,
        job_skills,
        matching_skills: matching,
    })
}

/// POST /api/challenges/generate
pub async fn handle_generate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<GenerateChallengesRequest>,
) -> Result<Json<GenerateChallengesResponse>, AppError> {
    let plan = plan_generation(req)?;
    info!(
        "Generating {} {} challenges for user {}",
        plan.count, plan.difficulty, user.id
    );

    let generated: GeneratedChallenges = state
        .llm
        .call_json(&plan.prompt, CHALLENGE_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(format!("Failed to generate challenges: {e}")))?;
    if generated.challenges.is_empty() {
        return Err(AppError::Llm("Model returned no challenges".to_string()));
    }

    let mut saved = Vec::with_capacity(generated.challenges.len());
    for input in generated.challenges.into_iter().take(plan.count as usize) {
        let challenge = input.with_defaults(plan.difficulty);
        saved.push(insert_challenge(&state.db, Some(user.id), challenge).await?);
    }
    info!("Saved {} generated challenges", saved.len());

    Ok(Json(GenerateChallengesResponse {
        success: true,
        challenges: saved,
        metadata: GenerationMetadata {
            cv_skills: plan.cv_skills,
            job_skills: plan.job_skills,
            matching_skills: plan.matching_skills,
            generated_at: Utc::now(),
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub code: Option<String>,
    pub language: Option<String>,
    pub test_cases: Option<Vec<TestCase>>,
    pub time_limit: Option<f64>,
    pub memory_limit: Option<u64>,
}

#[derive(Serialize)]
pub struct ExecutionResponse {
    pub results: Vec<TestResult>,
    pub metrics: ExecutionMetrics,
}

pub struct ExecutionJob {
    pub code: String,
    pub language: Language,
    pub test_cases: Vec<TestCase>,
    pub limits: Limits,
}

pub fn validate_execution(req: ExecutionRequest) -> Result<ExecutionJob, AppError> {
    let (Some(code), Some(language), Some(test_cases)) = (
        req.code.filter(|c| !c.trim().is_empty()),
        req.language,
        req.test_cases.filter(|t| !t.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Invalid request: code, language, and testCases are required".to_string(),
        ));
    };
    if code.len() > MAX_CODE_BYTES {
        return Err(AppError::Validation("Code exceeds 50KB limit".to_string()));
    }
    let parsed = Language::parse(&language)
        .ok_or_else(|| AppError::Validation(format!("Unsupported language: {language}")))?;
    let defaults = Limits::default();
    Ok(ExecutionJob {
        code,
        language: parsed,
        test_cases,
        limits: Limits {
            time_limit: req.time_limit.filter(|t| *t > 0.0).unwrap_or(defaults.time_limit),
            memory_limit: req.memory_limit.filter(|m| *m > 0).unwrap_or(defaults.memory_limit),
        },
    })
}

/// POST /api/code-execution
pub async fn handle_execute(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResponse>, AppError> {
    let runner = state
        .code_runner
        .clone()
        .ok_or(AppError::NotConfigured("Code execution"))?;
    let job = validate_execution(req)?;
    info!(
        "User {} running {:?} against {} test cases on {}",
        user.id,
        job.language,
        job.test_cases.len(),
        runner.name()
    );

    let results =
        run_test_cases(runner.as_ref(), &job.code, job.language, &job.test_cases, job.limits).await;
    let metrics = metrics(&results);
    Ok(Json(ExecutionResponse { results, metrics }))
}

#[derive(Serialize)]
pub struct SubmissionList {
    pub submissions: Vec<SubmissionRow>,
    pub total: i64,
}

/// GET /api/submissions
pub async fn handle_list_submissions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<SubmissionFilter>,
) -> Result<Json<SubmissionList>, AppError> {
    let (submissions, total) = list_submissions(&state.db, user.id, &filter).await?;
    Ok(Json(SubmissionList { submissions, total }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetrics {
    #[serde(default)]
    pub passed_tests: i32,
    #[serde(default)]
    pub total_tests: i32,
    pub avg_execution_time: Option<f64>,
    pub avg_memory_used: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub challenge_id: Option<Uuid>,
    pub language: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub metrics: SubmissionMetrics,
}

/// Accepted only when every test ran and passed.
pub fn submission_status(metrics: &SubmissionMetrics) -> &'static str {
    if metrics.total_tests > 0 && metrics.passed_tests == metrics.total_tests {
        STATUS_ACCEPTED
    } else {
        STATUS_WRONG_ANSWER
    }
}

pub fn validate_submission(req: SubmitRequest) -> Result<(Uuid, NewSubmission), AppError> {
    let (Some(challenge_id), Some(language), Some(code)) = (
        req.challenge_id,
        req.language.filter(|l| !l.trim().is_empty()),
        req.code.filter(|c| !c.trim().is_empty()),
    ) else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };
    if code.len() > MAX_CODE_BYTES {
        return Err(AppError::Validation("Code exceeds 50KB limit".to_string()));
    }
    let m = &req.metrics;
    if m.passed_tests < 0 || m.total_tests < 0 || m.passed_tests > m.total_tests {
        return Err(AppError::Validation("Invalid test metrics".to_string()));
    }
    let status = submission_status(m).to_string();
    Ok((
        challenge_id,
        NewSubmission {
            challenge_id: Some(challenge_id),
            language,
            code,
            passed_tests: m.passed_tests,
            total_tests: m.total_tests,
            execution_time: m.avg_execution_time,
            memory_used: m.avg_memory_used,
            status,
        },
    ))
}

/// POST /api/submissions
pub async fn handle_submit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmissionRow>), AppError> {
    let (challenge_id, submission) = validate_submission(req)?;
    get_challenge(&state.db, challenge_id).await?;
    require_limit(&state.db, &user, LimitKind::CodeChallenges).await?;

    let row = insert_submission(&state.db, user.id, submission).await?;
    if row.status != STATUS_ACCEPTED {
        warn!(
            "Submission {} for challenge {challenge_id}: {}/{} passed",
            row.id, row.passed_tests, row.total_tests
        );
    }
    Ok((StatusCode::CREATED, Json(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_challenge_defaults() {
        let input: ChallengeInput = serde_json::from_value(json!({
            "title": "Two Sum",
            "difficulty": "hard",
            "timeLimit": 0,
            "testCases": [{ "id": "1", "input": "1 2", "expectedOutput": "3" }]
        }))
        .unwrap();
        let challenge = input.with_defaults("Medium");
        assert_eq!(challenge.difficulty, "Hard");
        assert_eq!(challenge.time_limit, 1000);
        assert_eq!(challenge.memory_limit, 256);
        assert_eq!(challenge.category, "General");
        assert!(challenge.starter_code.java.unwrap().contains("// Two Sum"));

        let empty = ChallengeInput::default().with_defaults("Easy");
        assert_eq!(empty.title, "Untitled Challenge");
        assert_eq!(empty.difficulty, "Easy");
    }

    #[test]
    fn test_admin_challenge_requires_fields() {
        let input: ChallengeInput = serde_json::from_value(json!({
            "title": "FizzBuzz",
            "difficulty": "Easy",
            "description": "Print numbers"
        }))
        .unwrap();
        assert!(matches!(input.validated(), Err(AppError::Validation(_))));

        let input: ChallengeInput = serde_json::from_value(json!({
            "title": "FizzBuzz",
            "difficulty": "trivial",
            "description": "Print numbers",
            "testCases": [{ "id": "1", "input": "3", "expectedOutput": "Fizz" }]
        }))
        .unwrap();
        assert!(input.validated().is_err());
    }

    #[test]
    fn test_plan_generation() {
        let plan = plan_generation(GenerateChallengesRequest {
            cv_data: Some(json!({ "skills": ["Rust", "Docker"] })),
            job_description: Some("We need Rust and Kubernetes".into()),
            difficulty: None,
            count: Some(9),
        })
        .unwrap();
        assert_eq!(plan.difficulty, "Medium");
        assert_eq!(plan.count, MAX_GENERATED);
        assert_eq!(plan.job_skills, vec!["Rust", "Kubernetes"]);
        assert_eq!(plan.matching_skills, vec!["Rust"]);
        assert!(plan.prompt.contains("Generate exactly 5 challenges"));
        assert!(plan.prompt.contains("CV: N/A"));

        let missing = plan_generation(GenerateChallengesRequest {
            cv_data: None,
            job_description: Some("Rust".into()),
            difficulty: None,
            count: None,
        });
        assert!(matches!(missing, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_execution() {
        let job = validate_execution(ExecutionRequest {
            code: Some("print(1)".into()),
            language: Some("python".into()),
            test_cases: Some(vec![TestCase {
                id: "1".into(),
                input: String::new(),
                expected_output: "1".into(),
            }]),
            time_limit: None,
            memory_limit: None,
        })
        .unwrap();
        assert_eq!(job.language, Language::Python);
        assert_eq!(job.limits.memory_limit, 256_000);

        let unsupported = validate_execution(ExecutionRequest {
            code: Some("x".into()),
            language: Some("brainfuck".into()),
            test_cases: Some(vec![]),
            time_limit: None,
            memory_limit: None,
        });
        assert!(matches!(unsupported, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_submission_status() {
        let req: SubmitRequest = serde_json::from_value(json!({
            "challengeId": "4f9d5a3c-1b2e-4c1a-9a57-0d6c2b8f1e11",
            "language": "rust",
            "code": "fn main() {}",
            "metrics": { "passedTests": 5, "totalTests": 5, "avgExecutionTime": 12.5 }
        }))
        .unwrap();
        let (_, submission) = validate_submission(req).unwrap();
        assert_eq!(submission.status, STATUS_ACCEPTED);
        assert_eq!(submission.execution_time, Some(12.5));

        assert_eq!(submission_status(&SubmissionMetrics::default()), STATUS_WRONG_ANSWER);

        let oversized: SubmitRequest = serde_json::from_value(json!({
            "challengeId": "4f9d5a3c-1b2e-4c1a-9a57-0d6c2b8f1e11",
            "language": "python",
            "code": "#".repeat(MAX_CODE_BYTES + 1)
        }))
        .unwrap();
        assert!(validate_submission(oversized).is_err());
    }
}
