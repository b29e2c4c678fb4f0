use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::billing::plans::LimitKind;
use crate::billing::usage::require_limit;
use crate::calendar::sync::push_interview;
use crate::calendar::tokens::google_access_token;
use crate::errors::AppError;
use crate::interviews::store::{
    default_template_id, delete_interview, get_interview, insert_interview, insert_template,
    interview_detail, list_interviews, list_templates, update_interview, with_details,
    InterviewDetail, InterviewFilter, InterviewPatch, NewInterview, NewTemplate, TemplateFilter,
};
use crate::models::interview::{InterviewRow, InterviewSettings, TemplateRow, KNOWN_STATUSES};
use crate::models::user::UserSummary;
use crate::notifications::mailer::{reminder_email, ReminderAudience, ReminderDetails};
use crate::state::AppState;

#[derive(Serialize)]
pub struct InterviewList {
    pub interviews: Vec<InterviewDetail>,
}

/// GET /api/interviews
pub async fn handle_list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<InterviewFilter>,
) -> Result<Json<InterviewList>, AppError> {
    let rows = list_interviews(&state.db, user.id, &filter).await?;
    let interviews = with_details(&state.db, rows).await?;
    Ok(Json(InterviewList { interviews }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub candidate_id: Option<Uuid>,
    pub interviewer_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    #[serde(rename = "isAIInterviewer", alias = "isAiInterviewer", default)]
    pub is_ai_interviewer: bool,
    pub allow_recording: Option<bool>,
    #[serde(default)]
    pub settings: InterviewSettings,
}

/// POST /api/interviews
pub async fn handle_create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<InterviewDetail>), AppError> {
    let candidate_id = req
        .candidate_id
        .ok_or_else(|| AppError::Validation("candidateId is required".to_string()))?;
    req.settings.validate().map_err(AppError::Validation)?;

    require_limit(&state.db, &user, LimitKind::Interviews).await?;
    if req.is_ai_interviewer {
        require_limit(&state.db, &user, LimitKind::AiMockSessions).await?;
    }

    let template_id = match req.template_id {
        Some(id) => id,
        None => default_template_id(&state.db, user.id).await?,
    };

    let interview = insert_interview(
        &state.db,
        &NewInterview {
            candidate_id,
            interviewer_id: req.interviewer_id,
            created_by: user.id,
            template_id,
            scheduled_at: req.scheduled_at,
            duration: req.duration,
            is_ai_interviewer: req.is_ai_interviewer,
            allow_recording: req.allow_recording.unwrap_or(true),
            settings: req.settings,
        },
    )
    .await?;
    info!("Interview {} created by user {}", interview.id, user.id);

    let interview = push_to_calendar(&state, user.id, interview).await;
    let detail = interview_detail(&state.db, interview).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Best-effort calendar push for the acting user. Failures are logged and the
/// interview is returned as it was.
async fn push_to_calendar(state: &AppState, user_id: Uuid, interview: InterviewRow) -> InterviewRow {
    let Some(client) = state.calendar.as_ref() else {
        return interview;
    };
    if interview.scheduled_at.is_none() {
        return interview;
    }

    let token = match google_access_token(&state.db, client, user_id).await {
        Ok(token) => token,
        Err(e) => {
            debug!("Skipping calendar push for interview {}: {e}", interview.id);
            return interview;
        }
    };

    match push_interview(&state.db, client, &token, &interview).await {
        Ok(event_id) => {
            info!("Interview {} linked to calendar event {event_id}", interview.id);
            get_interview(&state.db, interview.id).await.unwrap_or(interview)
        }
        Err(e) => {
            warn!("Failed to sync interview {} with Google Calendar: {e}", interview.id);
            interview
        }
    }
}

/// GET /api/interviews/:id
pub async fn handle_get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewDetail>, AppError> {
    let interview = get_interview(&state.db, id).await?;
    if !interview.can_view(&user) {
        return Err(AppError::Forbidden(
            "You are not a participant in this interview".to_string(),
        ));
    }
    Ok(Json(interview_detail(&state.db, interview).await?))
}

fn validate_patch(patch: &InterviewPatch) -> Result<(), AppError> {
    if let Some(status) = &patch.status {
        if !KNOWN_STATUSES.contains(&status.as_str()) {
            return Err(AppError::Validation(format!(
                "status must be one of {}",
                KNOWN_STATUSES.join(", ")
            )));
        }
    }
    if let Some(settings) = &patch.settings {
        settings.validate().map_err(AppError::Validation)?;
    }
    for (name, score) in [
        ("overallScore", patch.overall_score),
        ("technicalScore", patch.technical_score),
        ("behavioralScore", patch.behavioral_score),
        ("communicationScore", patch.communication_score),
    ] {
        if score.is_some_and(|s| !(0.0..=100.0).contains(&s)) {
            return Err(AppError::Validation(format!("{name} must be between 0 and 100")));
        }
    }
    Ok(())
}

/// PATCH /api/interviews/:id
pub async fn handle_update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<InterviewPatch>,
) -> Result<Json<InterviewDetail>, AppError> {
    validate_patch(&patch)?;

    let existing = get_interview(&state.db, id).await?;
    if !existing.can_manage(user.id) {
        return Err(AppError::Forbidden(
            "Only participants can update this interview".to_string(),
        ));
    }

    let mut interview = update_interview(&state.db, id, &patch).await?;
    if patch.touches_schedule() && interview.calendar_event_id.is_some() {
        interview = push_to_calendar(&state, user.id, interview).await;
    }

    Ok(Json(interview_detail(&state.db, interview).await?))
}

/// DELETE /api/interviews/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let interview = get_interview(&state.db, id).await?;
    if !interview.can_manage(user.id) {
        return Err(AppError::Forbidden(
            "Only participants can delete this interview".to_string(),
        ));
    }

    if let (Some(client), Some(event_id)) = (state.calendar.as_ref(), &interview.calendar_event_id) {
        match google_access_token(&state.db, client, user.id).await {
            Ok(token) => {
                if let Err(e) = client.delete_event(&token, event_id).await {
                    warn!("Failed to remove calendar event {event_id}: {e}");
                }
            }
            Err(e) => debug!("Leaving calendar event {event_id} in place: {e}"),
        }
    }

    delete_interview(&state.db, id).await?;
    info!("Interview {id} deleted by user {}", user.id);
    Ok(Json(json!({ "success": true, "message": "Interview deleted" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRemindersRequest {
    #[serde(default)]
    pub interview_ids: Vec<Uuid>,
}

/// POST /api/interviews/send-reminders
pub async fn handle_send_reminders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SendRemindersRequest>,
) -> Result<Json<Value>, AppError> {
    if req.interview_ids.is_empty() {
        return Err(AppError::Validation("Invalid interview IDs".to_string()));
    }

    let interviews = sqlx::query_as::<_, InterviewRow>(
        "SELECT * FROM interviews WHERE id = ANY($1) AND (candidate_id = $2 OR interviewer_id = $2 OR created_by = $2)",
    )
    .bind(&req.interview_ids)
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    if interviews.is_empty() {
        return Err(AppError::NotFound("No interviews found".to_string()));
    }

    let details = with_details(&state.db, interviews).await?;
    let mut emails_sent = 0usize;
    for detail in &details {
        for (to, audience) in reminder_recipients(detail) {
            let email = reminder_email(
                &to,
                audience,
                &ReminderDetails {
                    interview_id: detail.interview.id,
                    position: detail.interview.settings.position.as_deref(),
                    candidate_name: candidate_name(detail),
                    interviewer_name: detail.interviewer.as_ref().map(|u| u.name.as_str()),
                    scheduled_at: detail.interview.scheduled_at,
                    app_url: &state.config.app_url,
                },
            );
            match state.mailer.send(&email).await {
                Ok(_) => emails_sent += 1,
                Err(e) => warn!("Failed to send reminder for interview {}: {e}", detail.interview.id),
            }
        }
    }

    let ids: Vec<Uuid> = details.iter().map(|d| d.interview.id).collect();
    let updated = sqlx::query("UPDATE interviews SET reminder_sent_at = now() WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&state.db)
        .await?
        .rows_affected();

    Ok(Json(json!({
        "success": true,
        "sent": updated,
        "emailsSent": emails_sent,
        "message": format!("Reminders sent for {updated} interview(s)"),
    })))
}

fn candidate_name(detail: &InterviewDetail) -> Option<&str> {
    detail
        .interview
        .settings
        .candidate_name
        .as_deref()
        .or(detail.candidate.as_ref().map(|u| u.name.as_str()))
}

/// Interviewer account e-mail, then the candidate's contact e-mail from the
/// settings or, failing that, their account.
fn reminder_recipients(detail: &InterviewDetail) -> Vec<(String, ReminderAudience)> {
    let mut out = Vec::with_capacity(2);
    if let Some(UserSummary { email, .. }) = &detail.interviewer {
        if !email.is_empty() {
            out.push((email.clone(), ReminderAudience::Interviewer));
        }
    }
    let candidate_email = detail
        .interview
        .settings
        .candidate_email
        .clone()
        .or_else(|| detail.candidate.as_ref().map(|u| u.email.clone()))
        .filter(|e| !e.is_empty());
    if let Some(email) = candidate_email {
        out.push((email, ReminderAudience::Candidate));
    }
    out
}

#[derive(Serialize)]
pub struct TemplateList {
    pub templates: Vec<TemplateRow>,
}

/// GET /api/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<TemplateFilter>,
) -> Result<Json<TemplateList>, AppError> {
    let templates = list_templates(&state.db, user.id, &filter).await?;
    Ok(Json(TemplateList { templates }))
}

/// POST /api/templates
pub async fn handle_create_template(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<NewTemplate>,
) -> Result<(StatusCode, Json<TemplateRow>), AppError> {
    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("title is required".to_string()))?
        .to_string();
    if req.duration.is_some_and(|d| !(5..=480).contains(&d)) {
        return Err(AppError::Validation(
            "duration must be between 5 and 480 minutes".to_string(),
        ));
    }

    let template = insert_template(&state.db, user.id, &title, &req).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json as SqlJson;

    fn interview(settings: InterviewSettings) -> InterviewRow {
        InterviewRow {
            id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            interviewer_id: None,
            created_by: None,
            template_id: None,
            status: "scheduled".into(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            duration: None,
            is_ai_interviewer: false,
            allow_recording: true,
            video_recording_url: None,
            audio_recording_url: None,
            ai_analysis_report: None,
            overall_score: None,
            technical_score: None,
            behavioral_score: None,
            communication_score: None,
            settings: SqlJson(settings),
            calendar_event_id: None,
            calendar_synced_at: None,
            reminder_sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn person(name: &str, email: &str) -> UserSummary {
        UserSummary {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            image: None,
        }
    }

    #[test]
    fn test_reminders_prefer_settings_candidate_email() {
        let detail = InterviewDetail {
            interview: interview(InterviewSettings {
                candidate_email: Some("ada@personal.io".into()),
                ..Default::default()
            }),
            candidate: Some(person("Ada", "ada@account.io")),
            interviewer: Some(person("Grace", "grace@corp.io")),
            template: None,
        };
        let recipients = reminder_recipients(&detail);
        assert_eq!(
            recipients,
            vec![
                ("grace@corp.io".to_string(), ReminderAudience::Interviewer),
                ("ada@personal.io".to_string(), ReminderAudience::Candidate),
            ]
        );
        assert_eq!(candidate_name(&detail), Some("Ada"));
    }

    #[test]
    fn test_reminders_without_interviewer() {
        let detail = InterviewDetail {
            interview: interview(InterviewSettings::default()),
            candidate: Some(person("Ada", "ada@account.io")),
            interviewer: None,
            template: None,
        };
        assert_eq!(
            reminder_recipients(&detail),
            vec![("ada@account.io".to_string(), ReminderAudience::Candidate)]
        );
    }

    #[test]
    fn test_patch_validation() {
        assert!(validate_patch(&InterviewPatch {
            status: Some("completed".into()),
            overall_score: Some(88.5),
            ..Default::default()
        })
        .is_ok());
        assert!(validate_patch(&InterviewPatch {
            status: Some("archived".into()),
            ..Default::default()
        })
        .is_err());
        assert!(validate_patch(&InterviewPatch {
            technical_score: Some(140.0),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_create_request_accepts_original_field_names() {
        let req: CreateInterviewRequest = serde_json::from_value(json!({
            "candidateId": Uuid::nil(),
            "isAIInterviewer": true,
            "scheduledAt": "2026-05-04T14:30:00Z",
            "settings": { "position": "SRE" }
        }))
        .unwrap();
        assert!(req.is_ai_interviewer);
        assert_eq!(req.settings.position.as_deref(), Some("SRE"));
        assert!(req.allow_recording.is_none());
    }
}
