use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::StripeConfig;

const STRIPE_API: &str = "https://api.stripe.com/v1";

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
pub struct Customer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// The subset of a Stripe subscription object the billing flow reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub items: SubscriptionItems,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
}

impl Subscription {
    pub fn first_price(&self) -> Option<&Price> {
        self.items.data.first().map(|item| &item.price)
    }

    /// Newer API versions report the period on the item instead of the subscription.
    pub fn period(&self) -> (Option<i64>, Option<i64>) {
        let item = self.items.data.first();
        (
            self.current_period_start
                .or_else(|| item.and_then(|i| i.current_period_start)),
            self.current_period_end
                .or_else(|| item.and_then(|i| i.current_period_end)),
        )
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("userId").map(String::as_str)
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Minimal Stripe REST client. Requests are form-encoded as the API expects.
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            base_url: STRIPE_API.to_string(),
        })
    }

    pub async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: &str,
    ) -> Result<Customer, StripeError> {
        self.post(
            "/customers",
            &[
                ("email", email),
                ("name", name),
                ("metadata[userId]", user_id),
            ],
        )
        .await
    }

    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, StripeError> {
        self.post(
            "/checkout/sessions",
            &[
                ("customer", customer_id),
                ("mode", "subscription"),
                ("payment_method_types[0]", "card"),
                ("line_items[0][price]", price_id),
                ("line_items[0][quantity]", "1"),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
                ("metadata[userId]", user_id),
                ("subscription_data[metadata][userId]", user_id),
            ],
        )
        .await
    }

    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, StripeError> {
        self.post(
            "/billing_portal/sessions",
            &[("customer", customer_id), ("return_url", return_url)],
        )
        .await
    }

    pub async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, StripeError> {
        let url = format!("{}/subscriptions/{}", self.base_url, id);
        debug!("GET {url}");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, StripeError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StripeError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            error!("Stripe returned {status}: {message}");
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_period_falls_back_to_item() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "metadata": { "userId": "u1" },
            "items": { "data": [{
                "price": { "id": "price_m", "product": "prod_1" },
                "current_period_start": 100,
                "current_period_end": 200
            }]}
        }))
        .unwrap();

        assert_eq!(sub.period(), (Some(100), Some(200)));
        assert_eq!(sub.first_price().map(|p| p.id.as_str()), Some("price_m"));
        assert_eq!(sub.user_id(), Some("u1"));
        assert!(!sub.cancel_at_period_end);
    }
}
