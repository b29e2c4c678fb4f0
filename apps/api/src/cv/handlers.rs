use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::billing::plans::LimitKind;
use crate::billing::usage::require_limit;
use crate::cv::enhance::{enhance_prompt, enhanced_cv};
use crate::cv::extract::{
    extract_text, extracted_cv, structure_prompt, DocumentKind, ExtractedCv, MAX_UPLOAD_BYTES,
};
use crate::cv::store::{delete_cv, get_cv, insert_cv, list_cvs, update_cv};
use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::models::cv::CvRow;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CvList {
    pub cvs: Vec<CvRow>,
}

/// GET /api/cv
pub async fn handle_list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<CvList>, AppError> {
    let cvs = list_cvs(&state.db, user.id).await?;
    Ok(Json(CvList { cvs }))
}

#[derive(Debug, Deserialize)]
pub struct SaveCvRequest {
    pub id: Option<Uuid>,
    pub title: Option<String>,
    pub template: Option<String>,
    pub data: Option<Value>,
}

/// POST /api/cv
///
/// Creates a CV, or overwrites the caller's CV when `id` is given. Only
/// creation counts against the plan's CV quota.
pub async fn handle_save(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SaveCvRequest>,
) -> Result<(StatusCode, Json<CvRow>), AppError> {
    let data = req
        .data
        .filter(Value::is_object)
        .ok_or_else(|| AppError::Validation("CV data must be an object".to_string()))?;
    let title = req
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled CV".to_string());
    let template = req
        .template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "modern".to_string());

    match req.id {
        Some(id) => {
            let row = update_cv(&state.db, user.id, id, &title, &template, &data).await?;
            Ok((StatusCode::OK, Json(row)))
        }
        None => {
            require_limit(&state.db, &user, LimitKind::Cvs).await?;
            let row = insert_cv(&state.db, user.id, &title, &template, &data).await?;
            info!("User {} created CV {}", user.id, row.id);
            Ok((StatusCode::CREATED, Json(row)))
        }
    }
}

/// GET /api/cv/:id
pub async fn handle_get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CvRow>, AppError> {
    Ok(Json(get_cv(&state.db, user.id, id).await?))
}

/// DELETE /api/cv/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    delete_cv(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/cv/enhance
pub async fn handle_enhance(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(cv): Json<Value>,
) -> Result<Json<Value>, AppError> {
    if !cv.is_object() {
        return Err(AppError::Validation("CV data must be an object".to_string()));
    }
    let outcome = state.llm.call(&enhance_prompt(&cv), JSON_ONLY_SYSTEM).await;
    let enhanced = enhanced_cv(cv, outcome).map_err(|e| AppError::Llm(e.to_string()))?;
    Ok(Json(enhanced))
}

/// POST /api/cv/extract-pdf (multipart, field `file`)
pub async fn handle_extract_pdf(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ExtractedCv>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let kind = DocumentKind::detect(field.file_name(), field.content_type()).ok_or_else(|| {
            AppError::Validation("Unsupported file type. Please use PDF or TXT".to_string())
        })?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((kind, bytes));
        break;
    }
    let (kind, bytes) =
        upload.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation("File exceeds 10MB limit".to_string()));
    }

    info!("User {} extracting {:?} CV ({} bytes)", user.id, kind, bytes.len());
    let text = tokio::task::spawn_blocking(move || extract_text(kind, &bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("CV extraction task failed: {e}")))??;

    let outcome = state.llm.call(&structure_prompt(&text), JSON_ONLY_SYSTEM).await;
    Ok(Json(extracted_cv(text, outcome)))
}
