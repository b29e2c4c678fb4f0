use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::billing::plans::{is_active_status, SubscriptionTier};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub role: String,
    pub stripe_customer_id: Option<String>,
    pub subscription_tier: String,
    pub subscription_status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    /// The tier whose limits apply. A paid tier whose subscription is past due,
    /// canceled or inactive counts as `Free`.
    pub fn tier(&self) -> SubscriptionTier {
        if is_active_status(&self.subscription_status) {
            SubscriptionTier::parse(&self.subscription_tier)
        } else {
            SubscriptionTier::Free
        }
    }
}

/// The public slice of a user embedded in other responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[cfg(test)]
pub(crate) fn test_user(role: &str, tier: &str, status: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: "ada@jobprep.app".into(),
        name: "Ada".into(),
        image: None,
        role: role.into(),
        stripe_customer_id: None,
        subscription_tier: tier.into(),
        subscription_status: status.into(),
        current_period_end: None,
        cancel_at_period_end: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_subscription_keeps_paid_tier() {
        assert_eq!(test_user("user", "MONTHLY", "ACTIVE").tier(), SubscriptionTier::Monthly);
        assert_eq!(test_user("user", "YEARLY", "TRIALING").tier(), SubscriptionTier::Yearly);
    }

    #[test]
    fn test_lapsed_subscription_falls_back_to_free() {
        assert_eq!(test_user("user", "MONTHLY", "PAST_DUE").tier(), SubscriptionTier::Free);
        assert_eq!(test_user("user", "YEARLY", "CANCELED").tier(), SubscriptionTier::Free);
        assert_eq!(test_user("user", "FREE", "INACTIVE").tier(), SubscriptionTier::Free);
    }
}
