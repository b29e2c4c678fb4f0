use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::cv::CvRow;

pub async fn list_cvs(pool: &PgPool, user_id: Uuid) -> Result<Vec<CvRow>, AppError> {
    let rows = sqlx::query_as::<_, CvRow>(
        "SELECT id, user_id, title, template, data, created_at, updated_at
         FROM cvs WHERE user_id = $1 ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Another user's CV is reported as missing.
pub async fn get_cv(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<CvRow, AppError> {
    sqlx::query_as::<_, CvRow>(
        "SELECT id, user_id, title, template, data, created_at, updated_at
         FROM cvs WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("CV not found".to_string()))
}

pub async fn insert_cv(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    template: &str,
    data: &Value,
) -> Result<CvRow, AppError> {
    let row = sqlx::query_as::<_, CvRow>(
        "INSERT INTO cvs (user_id, title, template, data)
         VALUES ($1, $2, $3, $4)
         RETURNING id, user_id, title, template, data, created_at, updated_at",
    )
    .bind(user_id)
    .bind(title)
    .bind(template)
    .bind(data)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn update_cv(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    title: &str,
    template: &str,
    data: &Value,
) -> Result<CvRow, AppError> {
    sqlx::query_as::<_, CvRow>(
        "UPDATE cvs SET title = $3, template = $4, data = $5, updated_at = now()
         WHERE id = $1 AND user_id = $2
         RETURNING id, user_id, title, template, data, created_at, updated_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(title)
    .bind(template)
    .bind(data)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("CV not found".to_string()))
}

pub async fn delete_cv(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM cvs WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("CV not found".to_string()));
    }
    Ok(())
}
