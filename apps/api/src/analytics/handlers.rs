use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::analytics::aggregate::{aggregate, completion_rate, InterviewAggregate, InterviewScore};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interviews::store::get_interview;
use crate::models::analytics::InterviewAnalyticsRow;
use crate::models::interview::STATUS_SCHEDULED;
use crate::models::user::User;
use crate::state::AppState;

const RECENT_INTERVIEWS: i64 = 5;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub user_id: Option<Uuid>,
    pub interview_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct AnalyticsResponse {
    pub analytics: Vec<InterviewAnalyticsRow>,
    #[serde(flatten)]
    pub summary: InterviewAggregate,
}

/// Other users' analytics are admin-only.
fn target_user(user: &User, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    match requested {
        Some(id) if id != user.id && !user.is_admin() => Err(AppError::Forbidden(
            "You can only view your own analytics".to_string(),
        )),
        Some(id) => Ok(id),
        None => Ok(user.id),
    }
}

/// GET /api/analytics
pub async fn handle_get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let target = target_user(&user, params.user_id)?;

    let scores = sqlx::query_as::<_, InterviewScore>(
        "SELECT status, overall_score FROM interviews WHERE candidate_id = $1",
    )
    .bind(target)
    .fetch_all(&state.db)
    .await?;
    let summary = aggregate(&scores);

    let analytics = match params.interview_id {
        Some(interview_id) => {
            let interview = get_interview(&state.db, interview_id).await?;
            if !interview.is_participant(user.id) && !user.is_admin() {
                return Err(AppError::Forbidden(
                    "You are not a participant in this interview".to_string(),
                ));
            }
            sqlx::query_as::<_, InterviewAnalyticsRow>(
                "SELECT * FROM interview_analytics WHERE interview_id = $1 ORDER BY created_at DESC",
            )
            .bind(interview_id)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, InterviewAnalyticsRow>(
                r#"
                SELECT a.* FROM interview_analytics a
                JOIN interviews i ON i.id = a.interview_id
                WHERE i.candidate_id = $1
                ORDER BY a.created_at DESC
                "#,
            )
            .bind(target)
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(AnalyticsResponse { analytics, summary }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnalyticsRequest {
    pub interview_id: Option<Uuid>,
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
}

/// POST /api/analytics
pub async fn handle_create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateAnalyticsRequest>,
) -> Result<(StatusCode, Json<InterviewAnalyticsRow>), AppError> {
    let interview_id = req
        .interview_id
        .ok_or_else(|| AppError::Validation("interviewId is required".to_string()))?;
    let interview = get_interview(&state.db, interview_id).await?;
    if !interview.is_participant(user.id) {
        return Err(AppError::Forbidden(
            "You are not a participant in this interview".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, InterviewAnalyticsRow>(
        r#"
        INSERT INTO interview_analytics
            (interview_id, speech_clarity, speech_pace, filler_words, confidence, eye_contact,
             facial_expressions, body_language, response_time, accuracy_score,
             problem_solving_score, attention, participation, analysis_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(interview_id)
    .bind(req.speech_clarity)
    .bind(req.speech_pace)
    .bind(req.filler_words)
    .bind(req.confidence)
    .bind(req.eye_contact)
    .bind(req.facial_expressions)
    .bind(req.body_language)
    .bind(req.response_time)
    .bind(req.accuracy_score)
    .bind(req.problem_solving_score)
    .bind(req.attention)
    .bind(req.participation)
    .bind(req.analysis_data)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentInterview {
    pub id: Uuid,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub template_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_interviews: i64,
    pub completed_interviews: i64,
    pub upcoming_interviews: i64,
    pub completion_rate: i64,
    pub average_score: f64,
    pub templates_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUser {
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub user: StatsUser,
    pub stats: DashboardStats,
    pub recent_interviews: Vec<RecentInterview>,
}

/// GET /api/user/stats
pub async fn handle_user_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserStatsResponse>, AppError> {
    let scores = sqlx::query_as::<_, InterviewScore>(
        "SELECT status, overall_score FROM interviews WHERE candidate_id = $1",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    let summary = aggregate(&scores);

    let upcoming_interviews: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM interviews WHERE candidate_id = $1 AND status = $2 AND scheduled_at >= now()",
    )
    .bind(user.id)
    .bind(STATUS_SCHEDULED)
    .fetch_one(&state.db)
    .await?;

    let templates_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM interview_templates WHERE created_by = $1")
            .bind(user.id)
            .fetch_one(&state.db)
            .await?;

    let recent_interviews = sqlx::query_as::<_, RecentInterview>(
        r#"
        SELECT i.id, i.status, i.scheduled_at, i.created_at, t.title AS template_title
        FROM interviews i
        LEFT JOIN interview_templates t ON t.id = i.template_id
        WHERE i.candidate_id = $1
        ORDER BY i.created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user.id)
    .bind(RECENT_INTERVIEWS)
    .fetch_all(&state.db)
    .await?;

    let stats = DashboardStats {
        total_interviews: summary.total_interviews,
        completed_interviews: summary.completed_interviews,
        upcoming_interviews,
        completion_rate: completion_rate(summary.completed_interviews, summary.total_interviews),
        average_score: summary.average_score.round(),
        templates_count,
    };

    Ok(Json(UserStatsResponse {
        user: StatsUser {
            name: user.name,
            email: user.email,
            image: user.image,
        },
        stats,
        recent_interviews,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interview::STATUS_COMPLETED;
    use crate::models::user::test_user;

    fn user(role: &str) -> User {
        test_user(role, "FREE", "INACTIVE")
    }

    #[test]
    fn test_target_user_defaults_to_self() {
        let me = user("user");
        assert_eq!(target_user(&me, None).unwrap(), me.id);
        assert_eq!(target_user(&me, Some(me.id)).unwrap(), me.id);
    }

    #[test]
    fn test_other_users_require_admin() {
        let me = user("user");
        let other = Uuid::new_v4();
        assert!(matches!(target_user(&me, Some(other)), Err(AppError::Forbidden(_))));
        let admin = user("admin");
        assert_eq!(target_user(&admin, Some(other)).unwrap(), other);
    }

    #[test]
    fn test_response_flattens_summary() {
        let response = AnalyticsResponse {
            analytics: vec![],
            summary: aggregate(&[InterviewScore {
                status: STATUS_COMPLETED.into(),
                overall_score: Some(70.0),
            }]),
        };
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["completedInterviews"], 1);
        assert_eq!(value["averageScore"], 70.0);
        assert!(value["analytics"].as_array().unwrap().is_empty());
    }
}
