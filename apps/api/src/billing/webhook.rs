//! Stripe webhook verification and event application.
//!
//! Signature check: the `Stripe-Signature` header carries `t=<unix>` and one or
//! more `v1=<hex>` entries. Each `v1` is HMAC-SHA256 over `"{t}.{body}"` keyed
//! with the endpoint secret.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::plans::{tier_for_price, SubscriptionTier};
use crate::billing::stripe::{StripeClient, Subscription};
use crate::config::StripeConfig;
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("no matching signature")]
    SignatureMismatch,
}

/// Verifies a Stripe signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::MalformedHeader)?;
    let skew = now.checked_sub(ts).map(i64::unsigned_abs);
    if !matches!(skew, Some(secs) if secs <= SIGNATURE_TOLERANCE_SECS as u64) {
        return Err(WebhookError::StaleTimestamp);
    }

    for candidate in signatures {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| WebhookError::MalformedHeader)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares in constant time
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::SignatureMismatch)
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
    subscription: Option<String>,
    customer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    subscription: Option<String>,
    customer: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    currency: Option<String>,
    status: Option<String>,
    description: Option<String>,
    hosted_invoice_url: Option<String>,
    invoice_pdf: Option<String>,
}

/// What a subscription object means for the user row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub tier: SubscriptionTier,
    pub status: String,
    pub price_id: Option<String>,
    pub product_id: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

fn ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

pub fn subscription_update(sub: &Subscription, config: &StripeConfig) -> SubscriptionUpdate {
    let price = sub.first_price();
    let price_id = price.map(|p| p.id.clone());
    let tier = tier_for_price(
        price_id.as_deref(),
        config.price_monthly.as_deref(),
        config.price_yearly.as_deref(),
    );
    let (start, end) = sub.period();

    SubscriptionUpdate {
        tier,
        status: sub.status.to_ascii_uppercase(),
        price_id,
        product_id: price.and_then(|p| p.product.clone()),
        period_start: ts(start),
        period_end: ts(end),
        cancel_at_period_end: sub.cancel_at_period_end,
        canceled_at: ts(sub.canceled_at),
        trial_start: ts(sub.trial_start),
        trial_end: ts(sub.trial_end),
    }
}

/// Applies a verified event. Returns `false` when the event id was already processed.
pub async fn process_event(
    pool: &PgPool,
    stripe: &StripeClient,
    config: &StripeConfig,
    event: &StripeEvent,
) -> Result<bool, AppError> {
    let seen: Option<(String,)> = sqlx::query_as("SELECT id FROM stripe_events WHERE id = $1")
        .bind(&event.id)
        .fetch_optional(pool)
        .await?;
    if seen.is_some() {
        info!("Skipping already processed Stripe event {}", event.id);
        return Ok(false);
    }

    let object = event.data.object.clone();
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = parse_object(object)?;
            let Some(user_id) = session.metadata.get("userId").and_then(|s| s.parse().ok())
            else {
                warn!("No userId in checkout session metadata");
                return record_event(pool, event).await;
            };
            if let Some(subscription_id) = session.subscription {
                let sub = stripe
                    .retrieve_subscription(&subscription_id)
                    .await
                    .map_err(|e| AppError::Integration(e.to_string()))?;
                let customer = session.customer.unwrap_or_else(|| sub.customer.clone());
                apply_subscription(pool, user_id, &customer, &sub, config).await?;
            }
        }
        "customer.subscription.created" | "customer.subscription.updated" => {
            let sub: Subscription = parse_object(object)?;
            match resolve_user(pool, sub.user_id(), Some(&sub.customer)).await? {
                Some(user_id) => {
                    apply_subscription(pool, user_id, &sub.customer, &sub, config).await?
                }
                None => warn!("No user found for subscription {}", sub.id),
            }
        }
        "customer.subscription.deleted" => {
            let sub: Subscription = parse_object(object)?;
            match resolve_user(pool, sub.user_id(), Some(&sub.customer)).await? {
                Some(user_id) => cancel_subscription(pool, user_id, &sub.id).await?,
                None => warn!("No user found for subscription {}", sub.id),
            }
        }
        "invoice.payment_succeeded" => {
            let invoice: InvoiceObject = parse_object(object)?;
            if let Some(subscription_id) = invoice.subscription.as_deref() {
                let sub = stripe
                    .retrieve_subscription(subscription_id)
                    .await
                    .map_err(|e| AppError::Integration(e.to_string()))?;
                if let Some(user_id) =
                    resolve_user(pool, sub.user_id(), invoice.customer.as_deref()).await?
                {
                    record_payment(pool, user_id, &invoice).await?;
                }
            }
        }
        "invoice.payment_failed" => {
            let invoice: InvoiceObject = parse_object(object)?;
            if let Some(customer) = invoice.customer.as_deref() {
                sqlx::query(
                    "UPDATE users SET subscription_status = 'PAST_DUE', updated_at = now() WHERE stripe_customer_id = $1",
                )
                .bind(customer)
                .execute(pool)
                .await?;
            }
        }
        other => info!("Unhandled Stripe event type: {other}"),
    }

    record_event(pool, event).await
}

fn parse_object<T: serde::de::DeserializeOwned>(object: Value) -> Result<T, AppError> {
    serde_json::from_value(object)
        .map_err(|e| AppError::Validation(format!("Unexpected Stripe event payload: {e}")))
}

async fn record_event(pool: &PgPool, event: &StripeEvent) -> Result<bool, AppError> {
    sqlx::query(
        "INSERT INTO stripe_events (id, event_type) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .execute(pool)
    .await?;
    Ok(true)
}

async fn resolve_user(
    pool: &PgPool,
    metadata_user: Option<&str>,
    customer: Option<&str>,
) -> Result<Option<Uuid>, AppError> {
    if let Some(id) = metadata_user.and_then(|s| s.parse::<Uuid>().ok()) {
        return Ok(Some(id));
    }
    let Some(customer) = customer else {
        return Ok(None);
    };
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE stripe_customer_id = $1")
        .bind(customer)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

async fn apply_subscription(
    pool: &PgPool,
    user_id: Uuid,
    customer_id: &str,
    sub: &Subscription,
    config: &StripeConfig,
) -> Result<(), AppError> {
    let update = subscription_update(sub, config);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET stripe_customer_id = $2,
            subscription_tier = $3,
            subscription_status = $4,
            current_period_end = $5,
            cancel_at_period_end = $6,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(customer_id)
    .bind(update.tier.as_str())
    .bind(&update.status)
    .bind(update.period_end)
    .bind(update.cancel_at_period_end)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO subscriptions
            (user_id, stripe_subscription_id, stripe_price_id, stripe_product_id, tier, status,
             current_period_start, current_period_end, cancel_at_period_end, trial_start, trial_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (stripe_subscription_id) DO UPDATE SET
            stripe_price_id = EXCLUDED.stripe_price_id,
            stripe_product_id = EXCLUDED.stripe_product_id,
            tier = EXCLUDED.tier,
            status = EXCLUDED.status,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            canceled_at = $12,
            updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(&sub.id)
    .bind(&update.price_id)
    .bind(&update.product_id)
    .bind(update.tier.as_str())
    .bind(&update.status)
    .bind(update.period_start)
    .bind(update.period_end)
    .bind(update.cancel_at_period_end)
    .bind(update.trial_start)
    .bind(update.trial_end)
    .bind(update.canceled_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "User {user_id} subscription {} now {} ({})",
        sub.id,
        update.tier.as_str(),
        update.status
    );
    Ok(())
}

async fn cancel_subscription(
    pool: &PgPool,
    user_id: Uuid,
    subscription_id: &str,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        UPDATE users
        SET subscription_tier = 'FREE', subscription_status = 'CANCELED',
            cancel_at_period_end = FALSE, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE subscriptions SET status = 'CANCELED', canceled_at = now(), updated_at = now() WHERE stripe_subscription_id = $1",
    )
    .bind(subscription_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    info!("User {user_id} subscription {subscription_id} canceled");
    Ok(())
}

async fn record_payment(
    pool: &PgPool,
    user_id: Uuid,
    invoice: &InvoiceObject,
) -> Result<(), AppError> {
    let Some(payment_id) = invoice.payment_intent.as_deref() else {
        return Ok(());
    };
    sqlx::query(
        r#"
        INSERT INTO payments
            (user_id, stripe_payment_id, amount, currency, status, description, receipt_url, invoice_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (stripe_payment_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(payment_id)
    .bind(invoice.amount_paid)
    .bind(invoice.currency.as_deref().unwrap_or("usd"))
    .bind(invoice.status.as_deref().unwrap_or("succeeded"))
    .bind(&invoice.description)
    .bind(&invoice.hosted_invoice_url)
    .bind(&invoice.invoice_pdf)
    .execute(pool)
    .await?;
    Ok(())
}
