pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::cv::extract::MAX_UPLOAD_BYTES;
use crate::recordings::handlers::MAX_RECORDING_BYTES;
use crate::state::AppState;
use crate::{
    ai, analytics, billing, calendar, challenges, cv, interviews, livekit, notifications,
    recordings,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Interviews and templates
        .route(
            "/api/interviews",
            get(interviews::handlers::handle_list).post(interviews::handlers::handle_create),
        )
        .route(
            "/api/interviews/send-reminders",
            post(interviews::handlers::handle_send_reminders),
        )
        .route(
            "/api/interviews/:id",
            get(interviews::handlers::handle_get)
                .patch(interviews::handlers::handle_update)
                .delete(interviews::handlers::handle_delete),
        )
        .route(
            "/api/templates",
            get(interviews::handlers::handle_list_templates)
                .post(interviews::handlers::handle_create_template),
        )
        // Analytics
        .route(
            "/api/analytics",
            get(analytics::handlers::handle_get).post(analytics::handlers::handle_create),
        )
        .route("/api/user/stats", get(analytics::handlers::handle_user_stats))
        // AI
        .route(
            "/api/ai/generate-questions",
            post(ai::handlers::handle_generate_questions),
        )
        .route(
            "/api/ai/evaluate-answer",
            post(ai::handlers::handle_evaluate_answer),
        )
        // Coding challenges
        .route(
            "/api/challenges",
            get(challenges::handlers::handle_list).post(challenges::handlers::handle_create),
        )
        .route(
            "/api/challenges/generate",
            post(challenges::handlers::handle_generate),
        )
        .route("/api/challenges/:id", get(challenges::handlers::handle_get))
        .route(
            "/api/code-execution",
            post(challenges::handlers::handle_execute),
        )
        .route(
            "/api/submissions",
            get(challenges::handlers::handle_list_submissions)
                .post(challenges::handlers::handle_submit),
        )
        // CVs
        .route(
            "/api/cv",
            get(cv::handlers::handle_list).post(cv::handlers::handle_save),
        )
        .route("/api/cv/enhance", post(cv::handlers::handle_enhance))
        .route(
            "/api/cv/extract-pdf",
            post(cv::handlers::handle_extract_pdf).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/cv/:id",
            get(cv::handlers::handle_get).delete(cv::handlers::handle_delete),
        )
        // Calendar
        .route(
            "/api/calendar/authorize",
            get(calendar::handlers::handle_authorize),
        )
        .route(
            "/api/calendar/callback",
            post(calendar::handlers::handle_callback),
        )
        .route("/api/calendar/status", get(calendar::handlers::handle_status))
        .route(
            "/api/calendar/disconnect",
            delete(calendar::handlers::handle_disconnect),
        )
        .route("/api/calendar/export", post(calendar::handlers::handle_export))
        .route(
            "/api/calendar/events/:interview_id",
            delete(calendar::handlers::handle_delete_event),
        )
        .route("/api/calendar/sync", post(calendar::handlers::handle_sync))
        // Billing
        .route(
            "/api/stripe/checkout",
            post(billing::handlers::handle_checkout),
        )
        .route("/api/stripe/portal", post(billing::handlers::handle_portal))
        .route("/api/stripe/webhook", post(billing::handlers::handle_webhook))
        .route(
            "/api/subscription/usage",
            get(billing::handlers::handle_usage),
        )
        // Video
        .route(
            "/api/livekit/token",
            get(livekit::handlers::handle_token_get).post(livekit::handlers::handle_token_post),
        )
        .route(
            "/api/livekit/start-recording",
            post(livekit::handlers::handle_start_recording),
        )
        .route(
            "/api/livekit/stop-recording",
            post(livekit::handlers::handle_stop_recording),
        )
        .route("/api/livekit/webhook", post(livekit::handlers::handle_webhook))
        .route("/api/recordings", get(recordings::handlers::handle_list))
        .route(
            "/api/recordings/upload",
            post(recordings::handlers::handle_upload)
                .layer(DefaultBodyLimit::max(MAX_RECORDING_BYTES)),
        )
        .route(
            "/api/recordings/:id",
            get(recordings::handlers::handle_get).delete(recordings::handlers::handle_delete),
        )
        // Notifications
        .route(
            "/api/notifications",
            get(notifications::handlers::handle_list),
        )
        .route(
            "/api/notifications/subscribe",
            post(notifications::handlers::handle_subscribe),
        )
        .route(
            "/api/notifications/unsubscribe",
            post(notifications::handlers::handle_unsubscribe),
        )
        .route(
            "/api/notifications/send",
            post(notifications::handlers::handle_send),
        )
        .route(
            "/api/notifications/dismiss",
            post(notifications::handlers::handle_dismiss),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let app = build_router(AppState::for_tests().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_features() {
        let (status, body) = send(Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "jobprep-api");
        assert_eq!(body["features"]["billing"], true);
        assert_eq!(body["features"]["storage"], false);
    }

    #[tokio::test]
    async fn test_protected_routes_require_session() {
        for (method, uri) in [
            (Method::GET, "/api/interviews"),
            (Method::POST, "/api/interviews"),
            (Method::GET, "/api/challenges"),
            (Method::POST, "/api/code-execution"),
            (Method::GET, "/api/cv"),
            (Method::GET, "/api/recordings"),
            (Method::POST, "/api/notifications/send"),
            (Method::GET, "/api/subscription/usage"),
        ] {
            let (status, body) = send(method.clone(), uri, "{}").await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn test_stripe_webhook_rejects_unsigned_body() {
        let (status, _) = send(
            Method::POST,
            "/api/stripe/webhook",
            r#"{"id":"evt_1","type":"checkout.session.completed"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
