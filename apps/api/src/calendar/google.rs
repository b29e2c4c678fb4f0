use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::config::GoogleConfig;
use crate::models::interview::InterviewRow;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const EVENTS_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3/calendars/primary/events";

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Private extended property linking an event back to its interview.
pub const INTERVIEW_ID_PROPERTY: &str = "jobprepInterviewId";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid authorization URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    /// All-day events carry a date instead of a timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedProperties {
    #[serde(default)]
    pub private: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

/// An event as returned by the Calendar API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub extended_properties: Option<ExtendedProperties>,
}

impl RemoteEvent {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(|t| t.date_time)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end.as_ref().and_then(|t| t.date_time)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    /// The interview id we stamped on events created from this API.
    pub fn linked_interview_id(&self) -> Option<&str> {
        self.extended_properties
            .as_ref()
            .and_then(|p| p.private.get(INTERVIEW_ID_PROPERTY))
            .map(String::as_str)
    }
}

/// Body for insert and patch calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    pub reminders: Reminders,
    pub extended_properties: ExtendedProperties,
}

/// Builds the calendar event for an interview; `None` when it has no time yet.
pub fn event_for_interview(interview: &InterviewRow) -> Option<EventBody> {
    let start = interview.scheduled_at?;
    let end = start + chrono::Duration::minutes(interview.duration_minutes());
    let settings = &interview.settings.0;

    let attendees = settings
        .candidate_email
        .iter()
        .map(|email| Attendee {
            email: email.clone(),
        })
        .collect();

    let time_zone = Some(settings.timezone.clone().unwrap_or_else(|| "UTC".to_string()));

    Some(EventBody {
        summary: settings.event_summary(),
        description: settings.event_description(),
        start: EventTime {
            date_time: Some(start),
            date: None,
            time_zone: time_zone.clone(),
        },
        end: EventTime {
            date_time: Some(end),
            date: None,
            time_zone,
        },
        attendees,
        reminders: Reminders {
            use_default: false,
            overrides: vec![
                ReminderOverride {
                    method: "email".to_string(),
                    minutes: 24 * 60,
                },
                ReminderOverride {
                    method: "popup".to_string(),
                    minutes: 15,
                },
            ],
        },
        extended_properties: ExtendedProperties {
            private: HashMap::from([(INTERVIEW_ID_PROPERTY.to_string(), interview.id.to_string())]),
        },
    })
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<RemoteEvent>,
}

#[derive(Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    config: GoogleConfig,
}

impl GoogleCalendarClient {
    pub fn new(config: GoogleConfig) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http, config })
    }

    /// Consent URL requesting offline access so Google returns a refresh token.
    pub fn auth_url(&self, state: &str) -> Result<String, CalendarError> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, CalendarError> {
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens, CalendarError> {
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn insert_event(
        &self,
        access_token: &str,
        event: &EventBody,
    ) -> Result<RemoteEvent, CalendarError> {
        debug!("Creating calendar event '{}'", event.summary);
        let resp = self
            .http
            .post(EVENTS_ENDPOINT)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn patch_event(
        &self,
        access_token: &str,
        event_id: &str,
        event: &EventBody,
    ) -> Result<RemoteEvent, CalendarError> {
        debug!("Patching calendar event {event_id}");
        let resp = self
            .http
            .patch(format!("{EVENTS_ENDPOINT}/{event_id}"))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;
        decode(resp).await
    }

    /// Deleting an event that is already gone counts as success.
    pub async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), CalendarError> {
        let resp = self
            .http
            .delete(format!("{EVENTS_ENDPOINT}/{event_id}"))
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(());
        }
        let message = resp.text().await.unwrap_or_default();
        Err(CalendarError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Single (expanded) events starting at or after `time_min`, ordered by start.
    pub async fn list_upcoming(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<RemoteEvent>, CalendarError> {
        let resp = self
            .http
            .get(EVENTS_ENDPOINT)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;
        let list: EventList = decode(resp).await?;
        Ok(list.items)
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, CalendarError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        error!("Google API returned {status}: {message}");
        return Err(CalendarError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interview::InterviewSettings;
    use chrono::TimeZone;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn client() -> GoogleCalendarClient {
        GoogleCalendarClient::new(GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:3000/api/calendar/callback".into(),
        })
        .unwrap()
    }

    fn interview(scheduled: Option<DateTime<Utc>>) -> InterviewRow {
        let now = Utc::now();
        InterviewRow {
            id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            interviewer_id: None,
            created_by: None,
            template_id: None,
            status: "scheduled".into(),
            scheduled_at: scheduled,
            started_at: None,
            completed_at: None,
            duration: Some(45),
            is_ai_interviewer: false,
            allow_recording: true,
            video_recording_url: None,
            audio_recording_url: None,
            ai_analysis_report: None,
            overall_score: None,
            technical_score: None,
            behavioral_score: None,
            communication_score: None,
            settings: Json(InterviewSettings {
                position: Some("Backend Engineer".into()),
                candidate_name: Some("Ada".into()),
                candidate_email: Some("ada@example.com".into()),
                ..Default::default()
            }),
            calendar_event_id: None,
            calendar_synced_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_auth_url_requests_offline_consent() {
        let url = Url::parse(&client().auth_url("user-1").unwrap()).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["state"], "user-1");
        assert_eq!(params["client_id"], "client-123");
        assert!(params["scope"].contains("auth/calendar.events"));
    }

    #[test]
    fn test_event_for_interview() {
        let start = Utc.with_ymd_and_hms(2026, 11, 2, 14, 0, 0).unwrap();
        let row = interview(Some(start));
        let event = event_for_interview(&row).unwrap();

        assert_eq!(event.summary, "Interview: Backend Engineer - Ada");
        assert_eq!(event.start.date_time, Some(start));
        assert_eq!(
            event.end.date_time,
            Some(start + chrono::Duration::minutes(45))
        );
        assert_eq!(event.attendees[0].email, "ada@example.com");
        assert_eq!(
            event.extended_properties.private[INTERVIEW_ID_PROPERTY],
            row.id.to_string()
        );

        assert!(event_for_interview(&interview(None)).is_none());
    }

    #[test]
    fn test_remote_event_parsing() {
        let event: RemoteEvent = serde_json::from_value(serde_json::json!({
            "id": "evt1",
            "status": "confirmed",
            "summary": "Onsite",
            "start": { "dateTime": "2026-11-02T16:00:00+02:00" },
            "end": { "dateTime": "2026-11-02T17:00:00+02:00" },
            "updated": "2026-10-01T09:00:00.000Z",
            "extendedProperties": { "private": { "jobprepInterviewId": "abc" } }
        }))
        .unwrap();

        assert_eq!(
            event.start_time(),
            Some(Utc.with_ymd_and_hms(2026, 11, 2, 14, 0, 0).unwrap())
        );
        assert_eq!(event.linked_interview_id(), Some("abc"));
        assert!(!event.is_cancelled());
    }
}
