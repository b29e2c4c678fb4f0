use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::calendar::google::GoogleCalendarClient;
use crate::calendar::sync::{push_interview, run_sync, SyncReport};
use crate::calendar::tokens::{find_google_token, google_access_token, store_google_tokens};
use crate::errors::AppError;
use crate::interviews::store::get_interview;
use crate::models::integration::{IntegrationStatus, PROVIDER_GOOGLE};
use crate::state::AppState;

fn calendar(state: &AppState) -> Result<&GoogleCalendarClient, AppError> {
    state
        .calendar
        .as_ref()
        .ok_or(AppError::NotConfigured("Calendar"))
}

/// GET /api/calendar/authorize
pub async fn handle_authorize(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let url = calendar(&state)?
        .auth_url(&user.id.to_string())
        .map_err(|e| AppError::Integration(e.to_string()))?;
    Ok(Json(json!({ "authUrl": url })))
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// POST /api/calendar/callback
pub async fn handle_callback(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<Value>, AppError> {
    let client = calendar(&state)?;
    let code = req
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("Missing auth code".to_string()))?;
    if let Some(returned) = &req.state {
        if returned != &user.id.to_string() {
            return Err(AppError::Validation("OAuth state mismatch".to_string()));
        }
    }

    let tokens = client
        .exchange_code(&code)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;
    let row = store_google_tokens(&state.db, user.id, &tokens).await?;
    info!("Google Calendar connected for user {}", user.id);

    Ok(Json(json!({
        "success": true,
        "message": "Calendar connected successfully",
        "expiresAt": row.expires_at,
    })))
}

/// GET /api/calendar/status
pub async fn handle_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<IntegrationStatus>, AppError> {
    let row = find_google_token(&state.db, user.id).await?;
    Ok(Json(IntegrationStatus {
        connected: row.is_some(),
        expires_at: row.as_ref().and_then(|r| r.expires_at),
        scope: row.and_then(|r| r.scope),
    }))
}

/// DELETE /api/calendar/disconnect
pub async fn handle_disconnect(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let result = sqlx::query("DELETE FROM integration_tokens WHERE user_id = $1 AND provider = $2")
        .bind(user.id)
        .bind(PROVIDER_GOOGLE)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({
        "success": true,
        "disconnected": result.rows_affected() > 0,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub interview_id: Option<Uuid>,
}

/// POST /api/calendar/export
pub async fn handle_export(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ExportRequest>,
) -> Result<Json<Value>, AppError> {
    let client = calendar(&state)?;
    let interview_id = req
        .interview_id
        .ok_or_else(|| AppError::Validation("Missing interviewId".to_string()))?;

    let interview = get_interview(&state.db, interview_id).await?;
    if interview.interviewer_id != Some(user.id) {
        return Err(AppError::Forbidden(
            "Only the interviewer can export this interview".to_string(),
        ));
    }

    let token = google_access_token(&state.db, client, user.id).await?;
    let event_id = push_interview(&state.db, client, &token, &interview).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Interview exported to calendar",
        "eventId": event_id,
    })))
}

/// DELETE /api/calendar/events/:interview_id
pub async fn handle_delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(interview_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let client = calendar(&state)?;
    let interview = get_interview(&state.db, interview_id).await?;
    if interview.interviewer_id != Some(user.id) {
        return Err(AppError::Forbidden(
            "Only the interviewer can remove this event".to_string(),
        ));
    }
    let event_id = interview
        .calendar_event_id
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Interview has no calendar event".to_string()))?;

    let token = google_access_token(&state.db, client, user.id).await?;
    client
        .delete_event(&token, event_id)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;

    sqlx::query(
        "UPDATE interviews SET calendar_event_id = NULL, calendar_synced_at = NULL WHERE id = $1",
    )
    .bind(interview_id)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "success": true, "message": "Calendar event removed" })))
}

/// POST /api/calendar/sync
pub async fn handle_sync(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SyncReport>, AppError> {
    let client = calendar(&state)?;
    let token = google_access_token(&state.db, client, user.id).await?;
    let report = run_sync(&state.db, client, &token, user.id, &user.email, Utc::now()).await?;
    Ok(Json(report))
}
