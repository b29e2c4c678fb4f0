//! Subscription tiers and their monthly limits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    Free,
    Monthly,
    Yearly,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "FREE",
            SubscriptionTier::Monthly => "MONTHLY",
            SubscriptionTier::Yearly => "YEARLY",
        }
    }

    /// Unknown strings fall back to `Free`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "MONTHLY" => SubscriptionTier::Monthly,
            "YEARLY" => SubscriptionTier::Yearly,
            _ => SubscriptionTier::Free,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitKind {
    Interviews,
    AiMockSessions,
    CodeChallenges,
    Cvs,
    CoverLetters,
}

impl LimitKind {
    pub fn label(&self) -> &'static str {
        match self {
            LimitKind::Interviews => "interviews",
            LimitKind::AiMockSessions => "AI mock sessions",
            LimitKind::CodeChallenges => "code challenges",
            LimitKind::Cvs => "CVs",
            LimitKind::CoverLetters => "cover letters",
        }
    }
}

/// Monthly quotas; -1 means unlimited.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub interviews: i64,
    pub ai_mock_sessions: i64,
    pub code_challenges: i64,
    pub cvs: i64,
    pub cover_letters: i64,
}

impl PlanLimits {
    pub fn get(&self, kind: LimitKind) -> i64 {
        match kind {
            LimitKind::Interviews => self.interviews,
            LimitKind::AiMockSessions => self.ai_mock_sessions,
            LimitKind::CodeChallenges => self.code_challenges,
            LimitKind::Cvs => self.cvs,
            LimitKind::CoverLetters => self.cover_letters,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: &'static str,
    pub tier: SubscriptionTier,
    pub limits: PlanLimits,
}

pub const FREE_PLAN: Plan = Plan {
    name: "Free",
    tier: SubscriptionTier::Free,
    limits: PlanLimits {
        interviews: 3,
        ai_mock_sessions: 5,
        code_challenges: 10,
        cvs: 1,
        cover_letters: 0,
    },
};

pub const MONTHLY_PLAN: Plan = Plan {
    name: "Pro Monthly",
    tier: SubscriptionTier::Monthly,
    limits: PlanLimits {
        interviews: 50,
        ai_mock_sessions: 100,
        code_challenges: 200,
        cvs: 10,
        cover_letters: 50,
    },
};

pub const YEARLY_PLAN: Plan = Plan {
    name: "Pro Yearly",
    tier: SubscriptionTier::Yearly,
    limits: PlanLimits {
        interviews: -1,
        ai_mock_sessions: -1,
        code_challenges: -1,
        cvs: -1,
        cover_letters: -1,
    },
};

pub fn plan_for(tier: SubscriptionTier) -> &'static Plan {
    match tier {
        SubscriptionTier::Free => &FREE_PLAN,
        SubscriptionTier::Monthly => &MONTHLY_PLAN,
        SubscriptionTier::Yearly => &YEARLY_PLAN,
    }
}

/// Maps a Stripe price id onto a tier using the configured price ids.
pub fn tier_for_price(
    price_id: Option<&str>,
    monthly_price_id: Option<&str>,
    yearly_price_id: Option<&str>,
) -> SubscriptionTier {
    match price_id {
        Some(p) if Some(p) == monthly_price_id => SubscriptionTier::Monthly,
        Some(p) if Some(p) == yearly_price_id => SubscriptionTier::Yearly,
        _ => SubscriptionTier::Free,
    }
}

/// Only active or trialing subscriptions unlock a paid tier.
pub fn is_active_status(status: &str) -> bool {
    matches!(status.to_ascii_uppercase().as_str(), "ACTIVE" | "TRIALING")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheck {
    pub allowed: bool,
    pub limit: i64,
    pub current: i64,
    pub remaining: i64,
}

pub fn check_limit(tier: SubscriptionTier, kind: LimitKind, current_usage: i64) -> LimitCheck {
    let limit = plan_for(tier).limits.get(kind);

    if limit == -1 {
        return LimitCheck {
            allowed: true,
            limit: -1,
            current: current_usage,
            remaining: -1,
        };
    }

    LimitCheck {
        allowed: current_usage < limit,
        limit,
        current: current_usage,
        remaining: (limit - current_usage).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_interview_limit() {
        let check = check_limit(SubscriptionTier::Free, LimitKind::Interviews, 2);
        assert!(check.allowed);
        assert_eq!(check.remaining, 1);

        let check = check_limit(SubscriptionTier::Free, LimitKind::Interviews, 3);
        assert!(!check.allowed);
        assert_eq!(check.remaining, 0);
    }

    #[test]
    fn test_free_has_no_cover_letters() {
        let check = check_limit(SubscriptionTier::Free, LimitKind::CoverLetters, 0);
        assert!(!check.allowed);
        assert_eq!(check.limit, 0);
    }

    #[test]
    fn test_yearly_is_unlimited() {
        let check = check_limit(SubscriptionTier::Yearly, LimitKind::Cvs, 10_000);
        assert!(check.allowed);
        assert_eq!(check.limit, -1);
        assert_eq!(check.remaining, -1);
    }

    #[test]
    fn test_active_statuses() {
        assert!(is_active_status("ACTIVE"));
        assert!(is_active_status("trialing"));
        assert!(!is_active_status("PAST_DUE"));
        assert!(!is_active_status("CANCELED"));
        assert!(!is_active_status("INACTIVE"));
    }

    #[test]
    fn test_tier_for_price() {
        let monthly = Some("price_m");
        let yearly = Some("price_y");
        assert_eq!(tier_for_price(Some("price_m"), monthly, yearly), SubscriptionTier::Monthly);
        assert_eq!(tier_for_price(Some("price_y"), monthly, yearly), SubscriptionTier::Yearly);
        assert_eq!(tier_for_price(Some("price_x"), monthly, yearly), SubscriptionTier::Free);
        assert_eq!(tier_for_price(None, monthly, yearly), SubscriptionTier::Free);
        assert_eq!(tier_for_price(Some("price_m"), None, None), SubscriptionTier::Free);
    }

    #[test]
    fn test_tier_parse_round_trip() {
        for tier in [
            SubscriptionTier::Free,
            SubscriptionTier::Monthly,
            SubscriptionTier::Yearly,
        ] {
            assert_eq!(SubscriptionTier::parse(tier.as_str()), tier);
        }
        assert_eq!(SubscriptionTier::parse("enterprise"), SubscriptionTier::Free);
    }
}
