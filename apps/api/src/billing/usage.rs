use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::billing::plans::{check_limit, plan_for, LimitCheck, LimitKind, PlanLimits};
use crate::errors::AppError;
use crate::models::user::User;

/// Midnight UTC on the first day of `now`'s month.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounts {
    pub interviews: i64,
    pub ai_mock_sessions: i64,
    pub code_challenges: i64,
    pub cvs: i64,
    pub cover_letters: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub plan: &'static str,
    pub tier: String,
    pub status: String,
    pub period_start: DateTime<Utc>,
    #[serde(flatten)]
    pub usage: UsageCounts,
    pub limits: PlanLimits,
}

/// Counts one kind of usage since the start of the current month.
/// CVs count every stored CV, since that quota caps storage rather than activity.
pub async fn count_usage(
    pool: &PgPool,
    user_id: Uuid,
    kind: LimitKind,
    since: DateTime<Utc>,
) -> Result<i64, AppError> {
    let (count,): (i64,) = match kind {
        LimitKind::Interviews => {
            sqlx::query_as(
                "SELECT COUNT(*) FROM interviews WHERE (candidate_id = $1 OR interviewer_id = $1 OR created_by = $1) AND created_at >= $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await?
        }
        LimitKind::AiMockSessions => {
            sqlx::query_as(
                "SELECT COUNT(*) FROM interviews WHERE candidate_id = $1 AND is_ai_interviewer AND created_at >= $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await?
        }
        LimitKind::CodeChallenges => {
            sqlx::query_as(
                "SELECT COUNT(*) FROM code_submissions WHERE user_id = $1 AND created_at >= $2",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await?
        }
        LimitKind::Cvs => {
            sqlx::query_as("SELECT COUNT(*) FROM cvs WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?
        }
        LimitKind::CoverLetters => (0,),
    };
    Ok(count)
}

pub async fn usage_counts(
    pool: &PgPool,
    user_id: Uuid,
    since: DateTime<Utc>,
) -> Result<UsageCounts, AppError> {
    Ok(UsageCounts {
        interviews: count_usage(pool, user_id, LimitKind::Interviews, since).await?,
        ai_mock_sessions: count_usage(pool, user_id, LimitKind::AiMockSessions, since).await?,
        code_challenges: count_usage(pool, user_id, LimitKind::CodeChallenges, since).await?,
        cvs: count_usage(pool, user_id, LimitKind::Cvs, since).await?,
        cover_letters: count_usage(pool, user_id, LimitKind::CoverLetters, since).await?,
    })
}

pub fn usage_response(user: &User, usage: UsageCounts, since: DateTime<Utc>) -> UsageResponse {
    let plan = plan_for(user.tier());
    UsageResponse {
        plan: plan.name,
        tier: plan.tier.as_str().to_string(),
        status: user.subscription_status.clone(),
        period_start: since,
        usage,
        limits: plan.limits,
    }
}

/// Fails with `PlanLimit` once the user's tier quota for `kind` is used up.
pub async fn require_limit(
    pool: &PgPool,
    user: &User,
    kind: LimitKind,
) -> Result<LimitCheck, AppError> {
    let since = start_of_month(Utc::now());
    let current = count_usage(pool, user.id, kind, since).await?;
    let check = check_limit(user.tier(), kind, current);
    if !check.allowed {
        return Err(AppError::PlanLimit(format!(
            "You have reached your {} limit ({}). Upgrade to continue.",
            kind.label(),
            check.limit
        )));
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 15, 42, 7).unwrap();
        let start = start_of_month(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(start_of_month(start), start);
    }

    #[test]
    fn test_past_due_usage_reports_free_limits() {
        let user = crate::models::user::test_user("user", "YEARLY", "PAST_DUE");
        let usage = UsageCounts {
            interviews: 4,
            ai_mock_sessions: 0,
            code_challenges: 0,
            cvs: 1,
            cover_letters: 0,
        };
        let response = usage_response(&user, usage, start_of_month(Utc::now()));
        assert_eq!(response.plan, "Free");
        assert_eq!(response.tier, "FREE");
        assert_eq!(response.status, "PAST_DUE");
        assert_eq!(response.limits.interviews, 3);
        assert!(!check_limit(user.tier(), LimitKind::Interviews, 4).allowed);
    }
}
