//! Data access for interviews and interview templates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::interview::{InterviewRow, InterviewSettings, TemplateRow, STATUS_SCHEDULED};
use crate::models::user::UserSummary;

pub const DEFAULT_TEMPLATE_TITLE: &str = "General Interview";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewFilter {
    pub status: Option<String>,
    pub candidate_id: Option<Uuid>,
    pub interviewer_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
}

impl InterviewFilter {
    /// `status=all` is the same as no status filter.
    fn status(&self) -> Option<&str> {
        self.status.as_deref().filter(|s| !s.is_empty() && *s != "all")
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub duration: i32,
}

/// An interview with its participants and template embedded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewDetail {
    #[serde(flatten)]
    pub interview: InterviewRow,
    pub candidate: Option<UserSummary>,
    pub interviewer: Option<UserSummary>,
    pub template: Option<TemplateSummary>,
}

pub struct NewInterview {
    pub candidate_id: Uuid,
    pub interviewer_id: Option<Uuid>,
    pub created_by: Uuid,
    pub template_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub is_ai_interviewer: bool,
    pub allow_recording: bool,
    pub settings: InterviewSettings,
}

/// Fields a PATCH may change. `None` leaves the column untouched.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewPatch {
    pub status: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub interviewer_id: Option<Uuid>,
    pub allow_recording: Option<bool>,
    pub video_recording_url: Option<String>,
    pub audio_recording_url: Option<String>,
    pub ai_analysis_report: Option<String>,
    pub overall_score: Option<f64>,
    pub technical_score: Option<f64>,
    pub behavioral_score: Option<f64>,
    pub communication_score: Option<f64>,
    pub settings: Option<InterviewSettings>,
}

impl InterviewPatch {
    /// True when the change affects the calendar event.
    pub fn touches_schedule(&self) -> bool {
        self.scheduled_at.is_some() || self.duration.is_some() || self.settings.is_some()
    }
}

pub async fn get_interview(pool: &PgPool, id: Uuid) -> Result<InterviewRow, AppError> {
    sqlx::query_as::<_, InterviewRow>("SELECT * FROM interviews WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
}

/// Interviews the user takes part in or scheduled, newest scheduled first.
pub async fn list_interviews(
    pool: &PgPool,
    user_id: Uuid,
    filter: &InterviewFilter,
) -> Result<Vec<InterviewRow>, AppError> {
    Ok(sqlx::query_as::<_, InterviewRow>(
        r#"
        SELECT * FROM interviews
        WHERE (candidate_id = $1 OR interviewer_id = $1 OR created_by = $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR candidate_id = $3)
          AND ($4::uuid IS NULL OR interviewer_id = $4)
          AND ($5::uuid IS NULL OR template_id = $5)
        ORDER BY scheduled_at DESC NULLS LAST, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(filter.status())
    .bind(filter.candidate_id)
    .bind(filter.interviewer_id)
    .bind(filter.template_id)
    .fetch_all(pool)
    .await?)
}

/// Loads participants and templates for a batch of interviews in two queries.
pub async fn with_details(
    pool: &PgPool,
    interviews: Vec<InterviewRow>,
) -> Result<Vec<InterviewDetail>, AppError> {
    let user_ids: Vec<Uuid> = interviews
        .iter()
        .flat_map(|i| std::iter::once(i.candidate_id).chain(i.interviewer_id))
        .collect();
    let template_ids: Vec<Uuid> = interviews.iter().filter_map(|i| i.template_id).collect();

    let users: HashMap<Uuid, UserSummary> = sqlx::query_as::<_, UserSummary>(
        "SELECT id, name, email, image FROM users WHERE id = ANY($1)",
    )
    .bind(&user_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|u| (u.id, u))
    .collect();

    let templates: HashMap<Uuid, TemplateSummary> = sqlx::query_as::<_, TemplateSummary>(
        "SELECT id, title, category, difficulty, duration FROM interview_templates WHERE id = ANY($1)",
    )
    .bind(&template_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|t| (t.id, t))
    .collect();

    Ok(interviews
        .into_iter()
        .map(|interview| InterviewDetail {
            candidate: users.get(&interview.candidate_id).cloned(),
            interviewer: interview.interviewer_id.and_then(|id| users.get(&id).cloned()),
            template: interview.template_id.and_then(|id| templates.get(&id).cloned()),
            interview,
        })
        .collect())
}

pub async fn interview_detail(pool: &PgPool, interview: InterviewRow) -> Result<InterviewDetail, AppError> {
    with_details(pool, vec![interview])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("interview detail lost")))
}

/// The creator's "General Interview" template, created on first use.
pub async fn default_template_id(pool: &PgPool, user_id: Uuid) -> Result<Uuid, AppError> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM interview_templates WHERE title = $1 AND created_by = $2 LIMIT 1",
    )
    .bind(DEFAULT_TEMPLATE_TITLE)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    if let Some(id) = existing {
        return Ok(id);
    }

    Ok(sqlx::query_scalar(
        r#"
        INSERT INTO interview_templates (title, description, category, difficulty, duration, is_public, created_by)
        VALUES ($1, 'Default interview template', 'General', 'Medium', 60, FALSE, $2)
        RETURNING id
        "#,
    )
    .bind(DEFAULT_TEMPLATE_TITLE)
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

pub async fn insert_interview(pool: &PgPool, new: &NewInterview) -> Result<InterviewRow, AppError> {
    Ok(sqlx::query_as::<_, InterviewRow>(
        r#"
        INSERT INTO interviews
            (candidate_id, interviewer_id, created_by, template_id, status, scheduled_at,
             duration, is_ai_interviewer, allow_recording, settings)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(new.candidate_id)
    .bind(new.interviewer_id)
    .bind(new.created_by)
    .bind(new.template_id)
    .bind(STATUS_SCHEDULED)
    .bind(new.scheduled_at)
    .bind(new.duration)
    .bind(new.is_ai_interviewer)
    .bind(new.allow_recording)
    .bind(Json(&new.settings))
    .fetch_one(pool)
    .await?)
}

pub async fn update_interview(
    pool: &PgPool,
    id: Uuid,
    patch: &InterviewPatch,
) -> Result<InterviewRow, AppError> {
    sqlx::query_as::<_, InterviewRow>(
        r#"
        UPDATE interviews SET
            status              = COALESCE($2, status),
            scheduled_at        = COALESCE($3, scheduled_at),
            started_at          = COALESCE($4, started_at),
            completed_at        = COALESCE($5, completed_at),
            duration            = COALESCE($6, duration),
            interviewer_id      = COALESCE($7, interviewer_id),
            allow_recording     = COALESCE($8, allow_recording),
            video_recording_url = COALESCE($9, video_recording_url),
            audio_recording_url = COALESCE($10, audio_recording_url),
            ai_analysis_report  = COALESCE($11, ai_analysis_report),
            overall_score       = COALESCE($12, overall_score),
            technical_score     = COALESCE($13, technical_score),
            behavioral_score    = COALESCE($14, behavioral_score),
            communication_score = COALESCE($15, communication_score),
            settings            = COALESCE($16, settings),
            updated_at          = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&patch.status)
    .bind(patch.scheduled_at)
    .bind(patch.started_at)
    .bind(patch.completed_at)
    .bind(patch.duration)
    .bind(patch.interviewer_id)
    .bind(patch.allow_recording)
    .bind(&patch.video_recording_url)
    .bind(&patch.audio_recording_url)
    .bind(&patch.ai_analysis_report)
    .bind(patch.overall_score)
    .bind(patch.technical_score)
    .bind(patch.behavioral_score)
    .bind(patch.communication_score)
    .bind(patch.settings.as_ref().map(Json))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")))
}

pub async fn delete_interview(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM interviews WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFilter {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub is_public: Option<bool>,
}

/// Public templates plus the user's own; `isPublic` narrows to one side.
pub async fn list_templates(
    pool: &PgPool,
    user_id: Uuid,
    filter: &TemplateFilter,
) -> Result<Vec<TemplateRow>, AppError> {
    Ok(sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT * FROM interview_templates
        WHERE (is_public OR created_by = $1)
          AND ($2::bool IS NULL OR is_public = $2)
          AND ($3::text IS NULL OR category = $3)
          AND ($4::text IS NULL OR difficulty = $4)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(filter.is_public)
    .bind(&filter.category)
    .bind(&filter.difficulty)
    .fetch_all(pool)
    .await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub duration: Option<i32>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn insert_template(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    template: &NewTemplate,
) -> Result<TemplateRow, AppError> {
    Ok(sqlx::query_as::<_, TemplateRow>(
        r#"
        INSERT INTO interview_templates (title, description, category, difficulty, duration, is_public, created_by, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(&template.description)
    .bind(template.category.as_deref().unwrap_or("General"))
    .bind(template.difficulty.as_deref().unwrap_or("Medium"))
    .bind(template.duration.unwrap_or(60))
    .bind(template.is_public)
    .bind(user_id)
    .bind(&template.tags)
    .fetch_one(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_all_means_no_filter() {
        let filter = InterviewFilter {
            status: Some("all".into()),
            ..Default::default()
        };
        assert_eq!(filter.status(), None);
        let filter = InterviewFilter {
            status: Some("completed".into()),
            ..Default::default()
        };
        assert_eq!(filter.status(), Some("completed"));
    }

    #[test]
    fn test_patch_schedule_detection() {
        assert!(!InterviewPatch {
            status: Some("completed".into()),
            ..Default::default()
        }
        .touches_schedule());
        assert!(InterviewPatch {
            duration: Some(30),
            ..Default::default()
        }
        .touches_schedule());
    }

    #[test]
    fn test_filter_from_camel_case_query() {
        let id = Uuid::new_v4();
        let filter: InterviewFilter =
            serde_json::from_value(serde_json::json!({ "candidateId": id, "status": "scheduled" }))
                .unwrap();
        assert_eq!(filter.candidate_id, Some(id));
        assert_eq!(filter.status(), Some("scheduled"));
    }
}
