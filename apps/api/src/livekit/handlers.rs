use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interviews::store::get_interview;
use crate::livekit::egress::LiveKitService;
use crate::livekit::webhook::egress_outcome;
use crate::models::recording::{
    RecordingRow, RECORDING_COMPLETE, RECORDING_FAILED, RECORDING_IN_PROGRESS,
};
use crate::models::user::User;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_name: Option<String>,
    pub participant_name: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub url: String,
}

fn livekit(state: &AppState) -> Result<&LiveKitService, AppError> {
    state.livekit.as_ref().ok_or(AppError::NotConfigured("Video"))
}

/// Identity is always the session user's id so a caller cannot join as someone
/// else. `participantName` only sets the display name.
fn participant_identity(user: &User, requested_name: Option<String>) -> (String, String) {
    let display_name = requested_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| user.name.clone());
    (user.id.to_string(), display_name)
}

fn mint(state: &AppState, user: &User, req: TokenRequest) -> Result<TokenResponse, AppError> {
    let service = livekit(state)?;
    let room = req
        .room_name
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing roomName parameter".to_string()))?;
    let (identity, display_name) = participant_identity(user, req.participant_name);

    let token = service
        .minter()
        .participant_token(&room, &identity, Some(&display_name))
        .map_err(|e| AppError::Integration(e.to_string()))?;
    Ok(TokenResponse {
        token,
        url: service.ws_url().to_string(),
    })
}

/// GET /api/livekit/token?roomName=&participantName=
pub async fn handle_token_get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(req): Query<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(mint(&state, &user, req)?))
}

/// POST /api/livekit/token
pub async fn handle_token_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(mint(&state, &user, req)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub room_name: Option<String>,
    pub interview_id: Option<Uuid>,
}

/// POST /api/livekit/start-recording
pub async fn handle_start_recording(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<StartRecordingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = livekit(&state)?;
    let room = req
        .room_name
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Room name is required".to_string()))?;

    if let Some(interview_id) = req.interview_id {
        let interview = get_interview(&state.db, interview_id).await?;
        if !interview.is_participant(user.id) {
            return Err(AppError::Forbidden(
                "Not a participant in this interview".to_string(),
            ));
        }
        if !interview.allow_recording {
            return Err(AppError::Validation(
                "Recording is disabled for this interview".to_string(),
            ));
        }
    }

    let egress = service
        .start_room_recording(&room)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;

    let recording = sqlx::query_as::<_, RecordingRow>(
        r#"
        INSERT INTO recordings (user_id, interview_id, egress_id, room_name, status)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(req.interview_id)
    .bind(&egress.egress_id)
    .bind(&room)
    .bind(RECORDING_IN_PROGRESS)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "egressId": egress.egress_id,
        "status": "RECORDING_ACTIVE",
        "recording": recording,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordingRequest {
    pub egress_id: Option<String>,
}

/// POST /api/livekit/stop-recording
pub async fn handle_stop_recording(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<StopRecordingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = livekit(&state)?;
    let egress_id = req
        .egress_id
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Egress ID is required".to_string()))?;

    let recording = sqlx::query_as::<_, RecordingRow>(
        "SELECT * FROM recordings WHERE egress_id = $1 AND user_id = $2",
    )
    .bind(&egress_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Recording {egress_id} not found")))?;

    service
        .stop_recording(recording.room_name.as_deref().unwrap_or_default(), &egress_id)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;

    // The file location arrives later through the egress webhook.
    Ok(Json(json!({
        "success": true,
        "egressId": egress_id,
        "status": "RECORDING_STOPPING",
        "recordingUrl": recording.url,
    })))
}

/// POST /api/livekit/webhook
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let service = livekit(&state)?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .ok_or_else(|| AppError::Validation("Missing webhook authorization".to_string()))?;

    if let Err(e) = service.minter().verify_webhook(token, &body) {
        warn!("LiveKit webhook rejected: {e}");
        return Err(AppError::Validation(
            "Webhook signature verification failed".to_string(),
        ));
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {e}")))?;

    let Some(outcome) = egress_outcome(&payload) else {
        return Ok(Json(json!({ "success": true })));
    };
    info!(
        "Egress {} ended (complete: {})",
        outcome.egress_id, outcome.complete
    );

    let status = if outcome.complete {
        RECORDING_COMPLETE
    } else {
        RECORDING_FAILED
    };
    let recording = sqlx::query_as::<_, RecordingRow>(
        r#"
        UPDATE recordings
        SET status = $2,
            url = COALESCE($3, url),
            storage_key = COALESCE(storage_key, $3),
            size_bytes = COALESCE($4, size_bytes),
            duration_ms = COALESCE($5, duration_ms),
            updated_at = now()
        WHERE egress_id = $1
        RETURNING *
        "#,
    )
    .bind(&outcome.egress_id)
    .bind(status)
    .bind(&outcome.location)
    .bind(outcome.size_bytes)
    .bind(outcome.duration_ms)
    .fetch_optional(&state.db)
    .await?;

    match (&recording, outcome.complete, &outcome.location) {
        (Some(rec), true, Some(location)) => {
            if let Some(interview_id) = rec.interview_id {
                sqlx::query(
                    "UPDATE interviews SET video_recording_url = $2, updated_at = now() WHERE id = $1",
                )
                .bind(interview_id)
                .bind(location)
                .execute(&state.db)
                .await?;
            }
        }
        (None, _, _) => warn!("No recording row for egress {}", outcome.egress_id),
        _ => {}
    }

    Ok(Json(json!({ "success": true })))
}
