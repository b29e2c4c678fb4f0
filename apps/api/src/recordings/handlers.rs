use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interviews::store::get_interview;
use crate::models::recording::{RecordingRow, RECORDING_UPLOADED};
use crate::models::user::User;
use crate::recordings::storage::{recording_key, ObjectStorage};
use crate::state::AppState;

pub const MAX_RECORDING_BYTES: usize = 500 * 1024 * 1024;

fn storage(state: &AppState) -> Result<&ObjectStorage, AppError> {
    state
        .storage
        .as_ref()
        .ok_or(AppError::NotConfigured("Recording storage"))
}

#[derive(Serialize)]
pub struct RecordingList {
    pub recordings: Vec<RecordingRow>,
}

/// GET /api/recordings
///
/// Recordings the user made, plus those of interviews they took part in.
pub async fn handle_list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<RecordingList>, AppError> {
    let recordings = sqlx::query_as::<_, RecordingRow>(
        "SELECT r.* FROM recordings r
         LEFT JOIN interviews i ON i.id = r.interview_id
         WHERE r.user_id = $1 OR i.candidate_id = $1 OR i.interviewer_id = $1
         ORDER BY r.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(RecordingList { recordings }))
}

/// Loads a recording the user may see: their own, an interview
/// participant's, or any for admins.
async fn visible_recording(pool: &PgPool, user: &User, id: Uuid) -> Result<RecordingRow, AppError> {
    let recording = sqlx::query_as::<_, RecordingRow>("SELECT * FROM recordings WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Recording not found".to_string()))?;

    if recording.user_id == user.id || user.is_admin() {
        return Ok(recording);
    }
    if let Some(interview_id) = recording.interview_id {
        if get_interview(pool, interview_id).await?.is_participant(user.id) {
            return Ok(recording);
        }
    }
    Err(AppError::Forbidden(
        "You do not have access to this recording".to_string(),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingDetail {
    #[serde(flatten)]
    pub recording: RecordingRow,
    pub download_url: Option<String>,
}

/// GET /api/recordings/:id
pub async fn handle_get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordingDetail>, AppError> {
    let recording = visible_recording(&state.db, &user, id).await?;
    let download_url = match (&state.storage, &recording.storage_key) {
        (Some(storage), Some(key)) => match storage.presigned_get(key).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Could not presign recording {id}: {e}");
                recording.url.clone()
            }
        },
        _ => recording.url.clone(),
    };
    Ok(Json(RecordingDetail {
        recording,
        download_url,
    }))
}

/// DELETE /api/recordings/:id
///
/// The stored object is removed best-effort; the row is removed regardless.
pub async fn handle_delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let recording = visible_recording(&state.db, &user, id).await?;

    if let (Some(storage), Some(key)) = (&state.storage, &recording.storage_key) {
        if let Err(e) = storage.delete(key).await {
            warn!("Failed to delete recording object {key}, removing row anyway: {e}");
        }
    }

    sqlx::query("DELETE FROM recordings WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if let (Some(interview_id), Some(url)) = (recording.interview_id, &recording.url) {
        sqlx::query(
            "UPDATE interviews SET video_recording_url = NULL, updated_at = now()
             WHERE id = $1 AND video_recording_url = $2",
        )
        .bind(interview_id)
        .bind(url)
        .execute(&state.db)
        .await?;
    }

    info!("User {} deleted recording {id}", user.id);
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Parsed multipart upload.
pub struct RecordingUpload {
    pub interview_id: Uuid,
    pub room_name: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Only audio and video payloads are stored.
pub fn check_media(content_type: &str, size: usize) -> Result<(), AppError> {
    if !(content_type.starts_with("video/") || content_type.starts_with("audio/")) {
        return Err(AppError::Validation(format!(
            "Unsupported recording type: {content_type}"
        )));
    }
    if size == 0 {
        return Err(AppError::Validation("Recording is empty".to_string()));
    }
    if size > MAX_RECORDING_BYTES {
        return Err(AppError::Validation("Recording exceeds 500MB limit".to_string()));
    }
    Ok(())
}

pub fn extension_of(file_name: &str, content_type: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .unwrap_or_else(|| match content_type {
            "video/mp4" => "mp4".to_string(),
            "audio/mpeg" => "mp3".to_string(),
            "audio/wav" | "audio/x-wav" => "wav".to_string(),
            _ => "webm".to_string(),
        })
}

async fn read_upload(mut multipart: Multipart) -> Result<RecordingUpload, AppError> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("Invalid multipart body: {e}"))
    };
    let mut interview_id = None;
    let mut room_name = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        match field.name() {
            Some("interviewId") => {
                let text = field.text().await.map_err(bad)?;
                interview_id = Some(Uuid::parse_str(text.trim()).map_err(|_| {
                    AppError::Validation("Interview ID is invalid".to_string())
                })?);
            }
            Some("roomName") => {
                room_name = Some(field.text().await.map_err(bad)?).filter(|r| !r.trim().is_empty());
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("recording.webm").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("video/webm")
                    .to_string();
                let body = field.bytes().await.map_err(bad)?;
                file = Some((file_name, content_type, body));
            }
            _ => {}
        }
    }

    let (file_name, content_type, body) =
        file.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    let interview_id =
        interview_id.ok_or_else(|| AppError::Validation("Interview ID is required".to_string()))?;
    Ok(RecordingUpload {
        interview_id,
        room_name,
        file_name,
        content_type,
        body,
    })
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub recording: RecordingRow,
    pub message: &'static str,
}

/// POST /api/recordings/upload (multipart: `file`, `interviewId`, `roomName`)
pub async fn handle_upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let storage = storage(&state)?;
    let upload = read_upload(multipart).await?;
    check_media(&upload.content_type, upload.body.len())?;

    let interview = get_interview(&state.db, upload.interview_id).await?;
    if !interview.is_participant(user.id) {
        return Err(AppError::Forbidden(
            "Only interview participants can upload recordings".to_string(),
        ));
    }

    let key = recording_key(
        user.id,
        interview.id,
        &extension_of(&upload.file_name, &upload.content_type),
        Utc::now(),
    );
    let size = upload.body.len() as i64;
    let url = storage.put(&key, upload.body, &upload.content_type).await?;

    let recording = sqlx::query_as::<_, RecordingRow>(
        "INSERT INTO recordings
            (user_id, interview_id, room_name, storage_key, url, content_type, size_bytes, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING *",
    )
    .bind(user.id)
    .bind(interview.id)
    .bind(&upload.room_name)
    .bind(&key)
    .bind(&url)
    .bind(&upload.content_type)
    .bind(size)
    .bind(RECORDING_UPLOADED)
    .fetch_one(&state.db)
    .await?;

    sqlx::query("UPDATE interviews SET video_recording_url = $2, updated_at = now() WHERE id = $1")
        .bind(interview.id)
        .bind(&url)
        .execute(&state.db)
        .await?;

    info!(
        "User {} uploaded recording {} ({size} bytes) for interview {}",
        user.id, recording.id, interview.id
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            recording,
            message: "Recording uploaded successfully",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_media() {
        assert!(check_media("video/webm", 1024).is_ok());
        assert!(check_media("audio/wav", 1).is_ok());
        assert!(matches!(
            check_media("application/pdf", 1024),
            Err(AppError::Validation(_))
        ));
        assert!(check_media("video/mp4", 0).is_err());
        assert!(check_media("video/mp4", MAX_RECORDING_BYTES + 1).is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("call.mp4", "video/webm"), "mp4");
        assert_eq!(extension_of("blob", "video/mp4"), "mp4");
        assert_eq!(extension_of("blob", "video/webm"), "webm");
        assert_eq!(extension_of("weird.extension", "audio/mpeg"), "mp3");
    }
}
