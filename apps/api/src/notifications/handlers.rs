use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::errors::AppError;
use crate::models::notification::{NotificationRow, PushSubscriptionRow};
use crate::state::AppState;

const DEFAULT_ICON: &str = "/icons/icon-192x192.png";
const DEFAULT_BADGE: &str = "/icons/badge-72x72.png";
const DEFAULT_TAG: &str = "notification";
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Deserialize)]
pub struct PushSubscription {
    pub endpoint: Option<String>,
    pub keys: Option<SubscriptionKeys>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub subscription: Option<PushSubscription>,
    pub user_agent: Option<String>,
}

/// POST /api/notifications/subscribe
pub async fn handle_subscribe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let subscription = req
        .subscription
        .filter(|s| s.endpoint.as_deref().is_some_and(|e| !e.is_empty()))
        .ok_or_else(|| AppError::Validation("Invalid subscription data".to_string()))?;
    let endpoint = subscription.endpoint.unwrap_or_default();
    let (p256dh, auth) = subscription
        .keys
        .map(|k| (k.p256dh, k.auth))
        .unwrap_or((None, None));

    let row = sqlx::query_as::<_, PushSubscriptionRow>(
        r#"
        INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (endpoint) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            p256dh = EXCLUDED.p256dh,
            auth = EXCLUDED.auth,
            user_agent = EXCLUDED.user_agent
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&endpoint)
    .bind(p256dh)
    .bind(auth)
    .bind(req.user_agent)
    .fetch_one(&state.db)
    .await?;

    info!("User {} subscribed to push notifications", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Successfully subscribed to notifications",
            "subscriptionId": row.id,
        })),
    ))
}

#[derive(Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: Option<String>,
}

/// POST /api/notifications/unsubscribe
pub async fn handle_unsubscribe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<Value>, AppError> {
    let endpoint = req
        .endpoint
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("Invalid endpoint".to_string()))?;

    let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1 AND user_id = $2")
        .bind(&endpoint)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully unsubscribed from notifications",
        "removed": result.rows_affected() > 0,
    })))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub unread: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<NotificationRow>,
    pub unread_count: i64,
}

/// GET /api/notifications
pub async fn handle_list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<NotificationList>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let unread_only = params.unread.unwrap_or(false);

    let notifications = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT * FROM notifications
        WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(user.id)
    .bind(unread_only)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    let unread_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    pub data: Option<Map<String, Value>>,
    pub target_user_id: Option<Uuid>,
    #[serde(default)]
    pub broadcast_to_all: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
    pub data: Map<String, Value>,
}

impl NotificationPayload {
    /// Stored alongside the notification so clients can render it later.
    fn stored_data(&self) -> Value {
        let mut data = self.data.clone();
        data.insert("icon".to_string(), json!(self.icon));
        data.insert("badge".to_string(), json!(self.badge));
        data.insert("actions".to_string(), json!(self.actions));
        Value::Object(data)
    }
}

pub fn build_payload(req: SendRequest) -> Result<(NotificationPayload, Recipients), AppError> {
    let (Some(title), Some(body)) = (
        req.title.filter(|t| !t.trim().is_empty()),
        req.body.filter(|b| !b.trim().is_empty()),
    ) else {
        return Err(AppError::Validation("Title and body are required".to_string()));
    };

    let recipients = match (req.target_user_id, req.broadcast_to_all) {
        (Some(user_id), _) => Recipients::User(user_id),
        (None, true) => Recipients::Everyone,
        (None, false) => {
            return Err(AppError::Validation(
                "Provide targetUserId or set broadcastToAll".to_string(),
            ))
        }
    };

    Ok((
        NotificationPayload {
            title,
            body,
            icon: req.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            badge: req.badge.unwrap_or_else(|| DEFAULT_BADGE.to_string()),
            tag: req.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            actions: req.actions,
            data: req.data.unwrap_or_default(),
        },
        recipients,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    User(Uuid),
    Everyone,
}

/// POST /api/notifications/send
pub async fn handle_send(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, AppError> {
    let (payload, recipients) = build_payload(req)?;
    let data = payload.stored_data();

    let delivered = match recipients {
        Recipients::User(user_id) => sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, body, tag, data)
            SELECT id, $2, $3, $4, $5 FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&payload.title)
        .bind(&payload.body)
        .bind(&payload.tag)
        .bind(&data)
        .execute(&state.db)
        .await?
        .rows_affected(),
        Recipients::Everyone => sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, body, tag, data)
            SELECT id, $1, $2, $3, $4 FROM users
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.body)
        .bind(&payload.tag)
        .bind(&data)
        .execute(&state.db)
        .await?
        .rows_affected(),
    };

    if let Recipients::User(user_id) = recipients {
        if delivered == 0 {
            return Err(AppError::NotFound(format!("User {user_id} not found")));
        }
    }

    info!(
        "Admin {} sent notification '{}' to {} user(s)",
        admin.id, payload.tag, delivered
    );

    Ok(Json(json!({
        "success": true,
        "message": "Notification sent successfully",
        "delivered": delivered,
        "notification": payload,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissRequest {
    pub notification_id: Option<Uuid>,
    pub notification_tag: Option<String>,
}

/// POST /api/notifications/dismiss
pub async fn handle_dismiss(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<DismissRequest>,
) -> Result<Json<Value>, AppError> {
    let tag = req
        .notification_tag
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Invalid notification tag".to_string()))?;

    // A specific id narrows the dismissal; otherwise every unread one with the tag.
    let result = sqlx::query(
        r#"
        UPDATE notifications SET read_at = now()
        WHERE user_id = $1 AND tag = $2 AND read_at IS NULL
          AND ($3::uuid IS NULL OR id = $3)
        "#,
    )
    .bind(user.id)
    .bind(&tag)
    .bind(req.notification_id)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Dismissal tracked",
        "dismissed": result.rows_affected(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: Value) -> SendRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_payload_defaults() {
        let target = Uuid::new_v4();
        let (payload, recipients) = build_payload(request(json!({
            "title": "Interview Reminder",
            "body": "Starts in 30 minutes",
            "targetUserId": target,
        })))
        .unwrap();
        assert_eq!(recipients, Recipients::User(target));
        assert_eq!(payload.icon, DEFAULT_ICON);
        assert_eq!(payload.badge, DEFAULT_BADGE);
        assert_eq!(payload.tag, DEFAULT_TAG);
        assert!(payload.actions.is_empty());
    }

    #[test]
    fn test_payload_requires_title_and_body() {
        let err = build_payload(request(json!({ "title": "x", "broadcastToAll": true })));
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = build_payload(request(json!({ "title": " ", "body": "y", "broadcastToAll": true })));
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_payload_requires_recipients() {
        let err = build_payload(request(json!({ "title": "x", "body": "y" })));
        assert!(matches!(err, Err(AppError::Validation(_))));

        let (_, recipients) =
            build_payload(request(json!({ "title": "x", "body": "y", "broadcastToAll": true })))
                .unwrap();
        assert_eq!(recipients, Recipients::Everyone);
    }

    #[test]
    fn test_stored_data_keeps_display_fields() {
        let (payload, _) = build_payload(request(json!({
            "title": "x",
            "body": "y",
            "broadcastToAll": true,
            "actions": [{ "action": "join", "title": "Join" }],
            "data": { "url": "/interview-room/1" },
        })))
        .unwrap();
        let data = payload.stored_data();
        assert_eq!(data["url"], "/interview-room/1");
        assert_eq!(data["actions"][0]["action"], "join");
        assert_eq!(data["icon"], DEFAULT_ICON);
    }
}
