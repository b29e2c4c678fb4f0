use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::user::User;

pub const STATUS_SCHEDULED: &str = "scheduled";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const KNOWN_STATUSES: [&str; 5] = [
    STATUS_SCHEDULED,
    STATUS_CONFIRMED,
    STATUS_IN_PROGRESS,
    STATUS_COMPLETED,
    STATUS_CANCELLED,
];

const INTERVIEW_TYPES: [&str; 4] = ["video", "phone", "in_person", "ai"];

/// Typed interview settings, stored as JSONB and validated on every write.
/// Calendar linkage is kept in dedicated columns, not in here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InterviewSettings {
    pub position: Option<String>,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub candidate_phone: Option<String>,
    #[serde(rename = "type")]
    pub interview_type: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: Option<i32>,
    pub timezone: Option<String>,
}

impl InterviewSettings {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(email) = &self.candidate_email {
            let valid = email
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                .unwrap_or(false);
            if !valid {
                return Err(format!("settings.candidateEmail '{email}' is not a valid email"));
            }
        }
        if let Some(minutes) = self.duration_minutes {
            if !(5..=480).contains(&minutes) {
                return Err("settings.durationMinutes must be between 5 and 480".to_string());
            }
        }
        if let Some(kind) = &self.interview_type {
            if !INTERVIEW_TYPES.contains(&kind.as_str()) {
                return Err(format!(
                    "settings.type must be one of {}",
                    INTERVIEW_TYPES.join(", ")
                ));
            }
        }
        if self.notes.as_ref().map(|n| n.len() > 5000).unwrap_or(false) {
            return Err("settings.notes must be at most 5000 characters".to_string());
        }
        Ok(())
    }

    /// Calendar event title, e.g. "Interview: Backend Engineer - Ada".
    pub fn event_summary(&self) -> String {
        format!(
            "Interview: {} - {}",
            self.position.as_deref().unwrap_or("Position"),
            self.candidate_name.as_deref().unwrap_or("Candidate")
        )
    }

    pub fn event_description(&self) -> String {
        format!(
            "Interview Details:\n\nPosition: {}\nCandidate: {}\nEmail: {}\nPhone: {}\nType: {}\n\nNotes:\n{}",
            self.position.as_deref().unwrap_or("N/A"),
            self.candidate_name.as_deref().unwrap_or("N/A"),
            self.candidate_email.as_deref().unwrap_or("N/A"),
            self.candidate_phone.as_deref().unwrap_or("N/A"),
            self.interview_type.as_deref().unwrap_or("video"),
            self.notes.as_deref().unwrap_or("No additional notes"),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub interviewer_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub is_ai_interviewer: bool,
    pub allow_recording: bool,
    pub video_recording_url: Option<String>,
    pub audio_recording_url: Option<String>,
    pub ai_analysis_report: Option<String>,
    pub overall_score: Option<f64>,
    pub technical_score: Option<f64>,
    pub behavioral_score: Option<f64>,
    pub communication_score: Option<f64>,
    pub settings: Json<InterviewSettings>,
    pub calendar_event_id: Option<String>,
    pub calendar_synced_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewRow {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.candidate_id == user_id || self.interviewer_id == Some(user_id)
    }

    /// Participants and whoever scheduled the interview may change or delete it.
    pub fn can_manage(&self, user_id: Uuid) -> bool {
        self.is_participant(user_id) || self.created_by == Some(user_id)
    }

    pub fn can_view(&self, user: &User) -> bool {
        self.can_manage(user.id) || user.is_admin()
    }

    /// Length in minutes: explicit duration, then settings, then one hour.
    pub fn duration_minutes(&self) -> i64 {
        self.duration
            .or(self.settings.duration_minutes)
            .unwrap_or(60) as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub duration: i32,
    pub is_public: bool,
    pub created_by: Uuid,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::test_user;

    #[test]
    fn test_settings_rejects_unknown_fields() {
        let raw = r#"{"position": "SRE", "googleCalendarEventId": "abc"}"#;
        assert!(serde_json::from_str::<InterviewSettings>(raw).is_err());
    }

    #[test]
    fn test_settings_camel_case_round_trip_fields() {
        let raw = r#"{"candidateName": "Ada", "type": "video", "durationMinutes": 45}"#;
        let settings: InterviewSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.candidate_name.as_deref(), Some("Ada"));
        assert_eq!(settings.interview_type.as_deref(), Some("video"));
        assert_eq!(settings.duration_minutes, Some(45));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation_errors() {
        let bad_email = InterviewSettings {
            candidate_email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(bad_email.validate().is_err());

        let bad_duration = InterviewSettings {
            duration_minutes: Some(2),
            ..Default::default()
        };
        assert!(bad_duration.validate().is_err());

        let bad_type = InterviewSettings {
            interview_type: Some("carrier-pigeon".into()),
            ..Default::default()
        };
        assert!(bad_type.validate().is_err());
    }

    #[test]
    fn test_event_summary_defaults() {
        assert_eq!(
            InterviewSettings::default().event_summary(),
            "Interview: Position - Candidate"
        );
        let settings = InterviewSettings {
            position: Some("Backend Engineer".into()),
            candidate_name: Some("Ada".into()),
            ..Default::default()
        };
        assert_eq!(settings.event_summary(), "Interview: Backend Engineer - Ada");
    }

    fn interview(candidate: Uuid, interviewer: Option<Uuid>, creator: Option<Uuid>) -> InterviewRow {
        let now = Utc::now();
        InterviewRow {
            id: Uuid::new_v4(),
            candidate_id: candidate,
            interviewer_id: interviewer,
            created_by: creator,
            template_id: None,
            status: STATUS_SCHEDULED.into(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            duration: None,
            is_ai_interviewer: false,
            allow_recording: true,
            video_recording_url: None,
            audio_recording_url: None,
            ai_analysis_report: None,
            overall_score: None,
            technical_score: None,
            behavioral_score: None,
            communication_score: None,
            settings: Json(InterviewSettings::default()),
            calendar_event_id: None,
            calendar_synced_at: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_creator_can_view_interview_for_others() {
        let creator = test_user("user", "FREE", "INACTIVE");
        let row = interview(Uuid::new_v4(), Some(Uuid::new_v4()), Some(creator.id));
        assert!(!row.is_participant(creator.id));
        assert!(row.can_manage(creator.id));
        assert!(row.can_view(&creator));
    }

    #[test]
    fn test_view_access_rules() {
        let candidate = test_user("user", "FREE", "INACTIVE");
        let interviewer = test_user("user", "FREE", "INACTIVE");
        let row = interview(candidate.id, Some(interviewer.id), None);
        assert!(row.can_view(&candidate));
        assert!(row.can_view(&interviewer));

        let stranger = test_user("user", "FREE", "INACTIVE");
        assert!(!row.can_view(&stranger));
        assert!(!row.can_manage(stranger.id));

        let admin = test_user("admin", "FREE", "INACTIVE");
        assert!(row.can_view(&admin));
        assert!(!row.can_manage(admin.id));
    }
}
