use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::billing::usage::{start_of_month, usage_counts, usage_response, UsageResponse};
use crate::billing::webhook::{process_event, verify_signature, StripeEvent};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// POST /api/stripe/checkout
pub async fn handle_checkout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let stripe = state.stripe.as_ref().ok_or(AppError::NotConfigured("Billing"))?;
    let price_id = req
        .price_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Price ID is required".to_string()))?;

    let user_id = user.id.to_string();
    let customer_id = match user.stripe_customer_id.clone() {
        Some(id) => id,
        None => {
            let customer = stripe
                .create_customer(&user.email, &user.name, &user_id)
                .await
                .map_err(|e| AppError::Integration(e.to_string()))?;
            sqlx::query("UPDATE users SET stripe_customer_id = $2, updated_at = now() WHERE id = $1")
                .bind(user.id)
                .bind(&customer.id)
                .execute(&state.db)
                .await?;
            info!("Created Stripe customer {} for user {}", customer.id, user.id);
            customer.id
        }
    };

    let app_url = &state.config.app_url;
    let session = stripe
        .create_checkout_session(
            &customer_id,
            &price_id,
            &user_id,
            &format!("{app_url}/dashboard?session_id={{CHECKOUT_SESSION_ID}}"),
            &format!("{app_url}/pricing"),
        )
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

/// POST /api/stripe/portal
pub async fn handle_portal(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    let stripe = state.stripe.as_ref().ok_or(AppError::NotConfigured("Billing"))?;
    let customer_id = user
        .stripe_customer_id
        .as_deref()
        .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))?;

    let portal = stripe
        .create_portal_session(customer_id, &format!("{}/dashboard", state.config.app_url))
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?;
    Ok(Json(json!({ "url": portal.url })))
}

/// POST /api/stripe/webhook
///
/// The body is taken raw so the signature is checked over the exact bytes
/// Stripe sent. Nothing touches the database until verification passes.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let (Some(config), Some(stripe)) = (state.config.stripe.as_ref(), state.stripe.as_ref())
    else {
        return Err(AppError::NotConfigured("Billing"));
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("No signature found".to_string()))?;

    if let Err(e) = verify_signature(&body, signature, &config.webhook_secret, Utc::now().timestamp())
    {
        warn!("Webhook signature verification failed: {e}");
        return Err(AppError::Validation(
            "Webhook signature verification failed".to_string(),
        ));
    }

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid event payload: {e}")))?;
    info!("Stripe event {} ({})", event.id, event.event_type);

    let processed = process_event(&state.db, stripe, config, &event).await?;
    Ok(Json(json!({ "received": true, "duplicate": !processed })))
}

/// GET /api/subscription/usage
pub async fn handle_usage(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UsageResponse>, AppError> {
    let since = start_of_month(Utc::now());
    let usage = usage_counts(&state.db, user.id, since).await?;
    Ok(Json(usage_response(&user, usage, since)))
}
