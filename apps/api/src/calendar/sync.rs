//! Two-way reconciliation between interviews and Google Calendar events.
//!
//! `plan_sync` is pure: it looks at the local interviews and the remote events
//! and decides what to do. `run_sync` executes a plan against the database and
//! the Calendar API, collecting per-item failures instead of aborting.
//!
//! An interview and an event are linked when `interviews.calendar_event_id`
//! equals the event id, or when the event carries our private
//! `jobprepInterviewId` property. Conflicts resolve to the most recent writer.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calendar::google::{event_for_interview, GoogleCalendarClient, RemoteEvent};
use crate::errors::AppError;
use crate::models::interview::{
    InterviewRow, InterviewSettings, STATUS_CONFIRMED, STATUS_SCHEDULED,
};

/// How far ahead remote events are pulled in.
pub const IMPORT_WINDOW_DAYS: i64 = 90;
pub const MAX_REMOTE_EVENTS: u32 = 250;

/// The fields of an interview that sync decisions depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub id: Uuid,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub calendar_event_id: Option<String>,
    pub calendar_synced_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InterviewRow> for SyncItem {
    fn from(row: &InterviewRow) -> Self {
        Self {
            id: row.id,
            status: row.status.clone(),
            scheduled_at: row.scheduled_at,
            calendar_event_id: row.calendar_event_id.clone(),
            calendar_synced_at: row.calendar_synced_at,
            updated_at: row.updated_at,
        }
    }
}

impl SyncItem {
    fn is_exportable(&self) -> bool {
        (self.status == STATUS_SCHEDULED || self.status == STATUS_CONFIRMED)
            && self.scheduled_at.is_some()
    }

    fn changed_locally(&self) -> bool {
        self.calendar_synced_at
            .map(|synced| self.updated_at > synced)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Unlinked interviews that need a new remote event.
    pub create_remote: Vec<Uuid>,
    /// Interviews whose remote event we created but never recorded.
    pub relink: Vec<(Uuid, String)>,
    /// Local edits to push: (interview, event id).
    pub update_remote: Vec<(Uuid, String)>,
    /// Remote edits to pull into the linked interview.
    pub update_local: Vec<(Uuid, RemoteEvent)>,
    /// Upcoming remote events with no local interview.
    pub import_local: Vec<RemoteEvent>,
    pub skipped: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.create_remote.is_empty()
            && self.relink.is_empty()
            && self.update_remote.is_empty()
            && self.update_local.is_empty()
            && self.import_local.is_empty()
    }
}

pub fn plan_sync(local: &[SyncItem], remote: &[RemoteEvent], now: DateTime<Utc>) -> SyncPlan {
    let mut plan = SyncPlan::default();

    let by_event: HashMap<&str, &SyncItem> = local
        .iter()
        .filter_map(|item| item.calendar_event_id.as_deref().map(|e| (e, item)))
        .collect();
    let by_id: HashMap<String, &SyncItem> =
        local.iter().map(|item| (item.id.to_string(), item)).collect();

    let mut relinked: HashSet<Uuid> = HashSet::new();
    let mut pulled: HashSet<Uuid> = HashSet::new();

    for event in remote {
        if event.is_cancelled() {
            plan.skipped += 1;
            continue;
        }

        if let Some(item) = by_event.get(event.id.as_str()) {
            if remote_wins(item, event) {
                plan.update_local.push((item.id, event.clone()));
                pulled.insert(item.id);
            }
            continue;
        }

        if let Some(linked) = event.linked_interview_id() {
            // Ours: either the link was lost locally or the interview is gone.
            match by_id.get(linked) {
                Some(item) if item.calendar_event_id.is_none() => {
                    plan.relink.push((item.id, event.id.clone()));
                    relinked.insert(item.id);
                }
                _ => plan.skipped += 1,
            }
            continue;
        }

        match event.start_time() {
            Some(start) if start >= now => plan.import_local.push(event.clone()),
            _ => plan.skipped += 1,
        }
    }

    for item in local {
        if relinked.contains(&item.id) || pulled.contains(&item.id) {
            continue;
        }
        match &item.calendar_event_id {
            None if item.is_exportable() => plan.create_remote.push(item.id),
            None => plan.skipped += 1,
            Some(event_id) if item.changed_locally() => {
                plan.update_remote.push((item.id, event_id.clone()))
            }
            Some(_) => {}
        }
    }

    plan
}

/// Remote edit newer than both the last sync and any local edit.
fn remote_wins(item: &SyncItem, event: &RemoteEvent) -> bool {
    let (Some(remote_updated), Some(synced)) = (event.updated, item.calendar_synced_at) else {
        return false;
    };
    remote_updated > synced && (!item.changed_locally() || remote_updated > item.updated_at)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub imported: usize,
    pub pulled: usize,
    pub skipped: usize,
    pub errors: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub item: String,
    pub error: String,
}

/// Interviews the user takes part in, as candidate or interviewer.
pub async fn load_user_interviews(pool: &PgPool, user_id: Uuid) -> Result<Vec<InterviewRow>, AppError> {
    Ok(sqlx::query_as::<_, InterviewRow>(
        "SELECT * FROM interviews WHERE candidate_id = $1 OR interviewer_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn mark_synced(pool: &PgPool, interview_id: Uuid, event_id: &str) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE interviews SET calendar_event_id = $2, calendar_synced_at = now() WHERE id = $1",
    )
    .bind(interview_id)
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Creates or updates the remote event for one interview and records the link.
pub async fn push_interview(
    pool: &PgPool,
    client: &GoogleCalendarClient,
    access_token: &str,
    interview: &InterviewRow,
) -> Result<String, AppError> {
    let event = event_for_interview(interview).ok_or_else(|| {
        AppError::Validation("Interview has no scheduled time".to_string())
    })?;

    let remote = match &interview.calendar_event_id {
        Some(event_id) => client.patch_event(access_token, event_id, &event).await,
        None => client.insert_event(access_token, &event).await,
    }
    .map_err(|e| AppError::Integration(e.to_string()))?;

    mark_synced(pool, interview.id, &remote.id).await?;
    Ok(remote.id)
}

fn settings_from_event(event: &RemoteEvent, user_email: &str) -> InterviewSettings {
    let candidate_email = event
        .attendees
        .iter()
        .map(|a| a.email.clone())
        .find(|email| !email.eq_ignore_ascii_case(user_email));
    InterviewSettings {
        position: event.summary.clone(),
        candidate_email,
        notes: event
            .description
            .as_ref()
            .map(|d| d.chars().take(5000).collect()),
        ..Default::default()
    }
}

fn event_duration(event: &RemoteEvent) -> Option<i32> {
    match (event.start_time(), event.end_time()) {
        (Some(start), Some(end)) if end > start => Some((end - start).num_minutes() as i32),
        _ => None,
    }
}

pub async fn run_sync(
    pool: &PgPool,
    client: &GoogleCalendarClient,
    access_token: &str,
    user_id: Uuid,
    user_email: &str,
    now: DateTime<Utc>,
) -> Result<SyncReport, AppError> {
    let interviews = load_user_interviews(pool, user_id).await?;
    let remote = client
        .list_upcoming(access_token, now, MAX_REMOTE_EVENTS)
        .await
        .map_err(|e| AppError::Integration(e.to_string()))?
        .into_iter()
        .filter(|e| {
            e.start_time()
                .map(|s| s <= now + Duration::days(IMPORT_WINDOW_DAYS))
                .unwrap_or(true)
        })
        .collect::<Vec<_>>();

    // Events linked to interviews in the past are outside the listing window;
    // they are left alone rather than treated as missing.
    let items: Vec<SyncItem> = interviews.iter().map(SyncItem::from).collect();
    let plan = plan_sync(&items, &remote, now);
    let rows: HashMap<Uuid, &InterviewRow> = interviews.iter().map(|i| (i.id, i)).collect();

    let mut report = SyncReport {
        skipped: plan.skipped,
        ..Default::default()
    };

    for id in &plan.create_remote {
        let Some(event) = rows.get(id).and_then(|row| event_for_interview(row)) else {
            continue;
        };
        match client.insert_event(access_token, &event).await {
            Ok(created) => {
                mark_synced(pool, *id, &created.id).await?;
                report.created += 1;
            }
            Err(e) => report.errors.push(SyncFailure {
                item: id.to_string(),
                error: e.to_string(),
            }),
        }
    }

    for (id, event_id) in &plan.relink {
        mark_synced(pool, *id, event_id).await?;
        report.updated += 1;
    }

    for (id, event_id) in &plan.update_remote {
        let Some(event) = rows.get(id).and_then(|row| event_for_interview(row)) else {
            continue;
        };
        match client.patch_event(access_token, event_id, &event).await {
            Ok(_) => {
                mark_synced(pool, *id, event_id).await?;
                report.updated += 1;
            }
            Err(e) => report.errors.push(SyncFailure {
                item: id.to_string(),
                error: e.to_string(),
            }),
        }
    }

    for (id, event) in &plan.update_local {
        sqlx::query(
            r#"
            UPDATE interviews
            SET scheduled_at = COALESCE($2, scheduled_at),
                duration = COALESCE($3, duration),
                updated_at = now(),
                calendar_synced_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(event.start_time())
        .bind(event_duration(event))
        .execute(pool)
        .await?;
        report.pulled += 1;
    }

    for event in &plan.import_local {
        let settings = settings_from_event(event, user_email);
        let result = sqlx::query(
            r#"
            INSERT INTO interviews
                (candidate_id, created_by, status, scheduled_at, duration, settings,
                 calendar_event_id, calendar_synced_at, updated_at)
            VALUES ($1, $1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (candidate_id, calendar_event_id)
                WHERE calendar_event_id IS NOT NULL
                DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(STATUS_SCHEDULED)
        .bind(event.start_time())
        .bind(event_duration(event))
        .bind(Json(&settings))
        .bind(&event.id)
        .execute(pool)
        .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => report.imported += 1,
            Ok(_) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to import calendar event {}: {e}", event.id);
                report.errors.push(SyncFailure {
                    item: event.id.clone(),
                    error: "failed to import event".to_string(),
                });
            }
        }
    }

    info!(
        "Calendar sync for {user_id}: {} created, {} updated, {} imported, {} pulled, {} errors",
        report.created,
        report.updated,
        report.imported,
        report.pulled,
        report.errors.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::google::{EventTime, ExtendedProperties, INTERVIEW_ID_PROPERTY};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn local(status: &str, hours_ahead: Option<i64>) -> SyncItem {
        SyncItem {
            id: Uuid::new_v4(),
            status: status.to_string(),
            scheduled_at: hours_ahead.map(|h| now() + Duration::hours(h)),
            calendar_event_id: None,
            calendar_synced_at: None,
            updated_at: now() - Duration::days(1),
        }
    }

    fn remote(id: &str, hours_ahead: i64) -> RemoteEvent {
        RemoteEvent {
            id: id.to_string(),
            status: Some("confirmed".to_string()),
            summary: Some("Panel interview".to_string()),
            start: Some(EventTime {
                date_time: Some(now() + Duration::hours(hours_ahead)),
                ..Default::default()
            }),
            end: Some(EventTime {
                date_time: Some(now() + Duration::hours(hours_ahead + 1)),
                ..Default::default()
            }),
            updated: Some(now() - Duration::days(2)),
            ..Default::default()
        }
    }

    /// Applies a plan the way `run_sync` does, against in-memory state.
    fn apply(
        plan: &SyncPlan,
        local: &mut Vec<SyncItem>,
        remote: &mut Vec<RemoteEvent>,
        at: DateTime<Utc>,
    ) {
        for id in &plan.create_remote {
            let event_id = format!("evt-{}", remote.len());
            let mut event = remote_at(&event_id, local.iter().find(|i| i.id == *id).unwrap());
            event.extended_properties = Some(ExtendedProperties {
                private: HashMap::from([(INTERVIEW_ID_PROPERTY.to_string(), id.to_string())]),
            });
            event.updated = Some(at);
            remote.push(event);
            let item = local.iter_mut().find(|i| i.id == *id).unwrap();
            item.calendar_event_id = Some(event_id);
            item.calendar_synced_at = Some(at);
        }
        for (id, event_id) in plan.relink.iter().chain(plan.update_remote.iter()) {
            let item = local.iter_mut().find(|i| i.id == *id).unwrap();
            item.calendar_event_id = Some(event_id.clone());
            item.calendar_synced_at = Some(at);
            if let Some(event) = remote.iter_mut().find(|e| e.id == *event_id) {
                event.updated = Some(at);
            }
        }
        for (id, event) in &plan.update_local {
            let item = local.iter_mut().find(|i| i.id == *id).unwrap();
            item.scheduled_at = event.start_time();
            item.updated_at = at;
            item.calendar_synced_at = Some(at);
        }
        for event in &plan.import_local {
            local.push(SyncItem {
                id: Uuid::new_v4(),
                status: STATUS_SCHEDULED.to_string(),
                scheduled_at: event.start_time(),
                calendar_event_id: Some(event.id.clone()),
                calendar_synced_at: Some(at),
                updated_at: at,
            });
        }
    }

    fn remote_at(id: &str, item: &SyncItem) -> RemoteEvent {
        let mut event = remote(id, 0);
        event.start = Some(EventTime {
            date_time: item.scheduled_at,
            ..Default::default()
        });
        event
    }

    #[test]
    fn test_first_sync_creates_and_imports() {
        let local_items = vec![
            local(STATUS_SCHEDULED, Some(24)),
            local(STATUS_CONFIRMED, Some(48)),
            local("completed", Some(-24)),
            local(STATUS_SCHEDULED, None),
        ];
        let remote_events = vec![remote("g1", 5), remote("g-past", -5)];

        let plan = plan_sync(&local_items, &remote_events, now());
        assert_eq!(plan.create_remote, vec![local_items[0].id, local_items[1].id]);
        assert_eq!(plan.import_local.len(), 1);
        assert_eq!(plan.import_local[0].id, "g1");
        assert!(plan.update_remote.is_empty());
        // completed, unscheduled and past remote event
        assert_eq!(plan.skipped, 3);
    }

    #[test]
    fn test_second_sync_is_a_no_op() {
        let mut local_items = vec![
            local(STATUS_SCHEDULED, Some(24)),
            local(STATUS_CONFIRMED, Some(72)),
        ];
        let mut remote_events = vec![remote("g1", 5), remote("g2", 30)];

        let first = plan_sync(&local_items, &remote_events, now());
        apply(&first, &mut local_items, &mut remote_events, now());
        assert_eq!(remote_events.len(), 4);
        assert_eq!(local_items.len(), 4);

        let later = now() + Duration::minutes(5);
        let second = plan_sync(&local_items, &remote_events, later);
        assert!(second.is_empty(), "unexpected work: {second:?}");
        apply(&second, &mut local_items, &mut remote_events, later);
        assert_eq!(remote_events.len(), 4);
        assert_eq!(local_items.len(), 4);
    }

    #[test]
    fn test_local_edit_is_pushed() {
        let mut item = local(STATUS_SCHEDULED, Some(24));
        item.calendar_event_id = Some("g1".to_string());
        item.calendar_synced_at = Some(now() - Duration::hours(2));
        item.updated_at = now() - Duration::hours(1);

        let plan = plan_sync(&[item.clone()], &[remote("g1", 24)], now());
        assert_eq!(plan.update_remote, vec![(item.id, "g1".to_string())]);
        assert!(plan.update_local.is_empty());
    }

    #[test]
    fn test_remote_edit_is_pulled_when_newer() {
        let mut item = local(STATUS_SCHEDULED, Some(24));
        item.calendar_event_id = Some("g1".to_string());
        item.calendar_synced_at = Some(now() - Duration::hours(3));
        item.updated_at = now() - Duration::hours(2);

        // Both changed since the last sync; the remote edit is more recent.
        let mut event = remote("g1", 26);
        event.updated = Some(now() - Duration::hours(1));

        let plan = plan_sync(&[item.clone()], &[event.clone()], now());
        assert_eq!(plan.update_local.len(), 1);
        assert!(plan.update_remote.is_empty());

        // The local edit wins when it is the later one.
        event.updated = Some(now() - Duration::hours(2) - Duration::minutes(30));
        let plan = plan_sync(&[item.clone()], &[event], now());
        assert!(plan.update_local.is_empty());
        assert_eq!(plan.update_remote, vec![(item.id, "g1".to_string())]);
    }

    #[test]
    fn test_lost_link_is_restored_not_duplicated() {
        let item = local(STATUS_SCHEDULED, Some(24));
        let mut event = remote("g9", 24);
        event.extended_properties = Some(ExtendedProperties {
            private: HashMap::from([(INTERVIEW_ID_PROPERTY.to_string(), item.id.to_string())]),
        });

        let plan = plan_sync(&[item.clone()], &[event], now());
        assert_eq!(plan.relink, vec![(item.id, "g9".to_string())]);
        assert!(plan.create_remote.is_empty());
        assert!(plan.import_local.is_empty());
    }

    #[test]
    fn test_events_of_deleted_interviews_are_not_reimported() {
        let mut event = remote("g3", 24);
        event.extended_properties = Some(ExtendedProperties {
            private: HashMap::from([(
                INTERVIEW_ID_PROPERTY.to_string(),
                Uuid::new_v4().to_string(),
            )]),
        });
        let mut cancelled = remote("g4", 24);
        cancelled.status = Some("cancelled".to_string());

        let plan = plan_sync(&[], &[event, cancelled], now());
        assert!(plan.is_empty());
        assert_eq!(plan.skipped, 2);
    }

    #[test]
    fn test_settings_from_event_skips_own_address() {
        let mut event = remote("g1", 2);
        event.attendees = vec![
            crate::calendar::google::Attendee {
                email: "Me@Example.com".into(),
            },
            crate::calendar::google::Attendee {
                email: "candidate@example.com".into(),
            },
        ];
        let settings = settings_from_event(&event, "me@example.com");
        assert_eq!(settings.candidate_email.as_deref(), Some("candidate@example.com"));
        assert_eq!(settings.position.as_deref(), Some("Panel interview"));
        assert_eq!(event_duration(&event), Some(60));
    }
}
