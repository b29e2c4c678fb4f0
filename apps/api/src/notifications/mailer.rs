//! Outbound e-mail through the Resend HTTP API.
//!
//! Without `RESEND_API_KEY` the mailer runs in development mode: messages are
//! logged instead of sent and a `dev-` id is returned, so flows that send
//! mail keep working locally.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EmailConfig;

const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resend API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: String,
}

#[derive(Clone)]
pub struct Mailer {
    client: Client,
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            config,
        })
    }

    pub fn is_dev_mode(&self) -> bool {
        self.config.resend_api_key.is_none()
    }

    /// Sends one message and returns the provider's message id.
    pub async fn send(&self, email: &Email) -> Result<String, MailError> {
        let Some(api_key) = self.config.resend_api_key.as_deref() else {
            info!(
                to = %email.to.join(", "),
                subject = %email.subject,
                "Email (development mode, not sent)"
            );
            debug!("Email body: {}", preview(&email.html, 200));
            return Ok(format!("dev-{}", Utc::now().timestamp_millis()));
        };

        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(api_key)
            .json(&ResendRequest {
                from: &self.config.from,
                email,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: ResendResponse = response.json().await?;
        debug!("Email {} sent to {}", sent.id, email.to.join(", "));
        Ok(sent.id)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

/// Which side of the interview a reminder is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAudience {
    Interviewer,
    Candidate,
}

pub struct ReminderDetails<'a> {
    pub interview_id: uuid::Uuid,
    pub position: Option<&'a str>,
    pub candidate_name: Option<&'a str>,
    pub interviewer_name: Option<&'a str>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub app_url: &'a str,
}

pub fn reminder_email(to: &str, audience: ReminderAudience, details: &ReminderDetails<'_>) -> Email {
    let when = details
        .scheduled_at
        .map(|t| t.format("%A, %B %-d %Y at %H:%M UTC").to_string())
        .unwrap_or_else(|| "Unknown time".to_string());
    let position = details.position.unwrap_or("Not specified");
    let join_url = format!(
        "{}/interview-room/{}",
        details.app_url.trim_end_matches('/'),
        details.interview_id
    );

    let (subject, lead) = match audience {
        ReminderAudience::Interviewer => {
            let candidate = details.candidate_name.unwrap_or("your candidate");
            (
                format!("Upcoming Interview Reminder: {candidate}"),
                format!(
                    "<p>You have an upcoming interview with <strong>{candidate}</strong></p>\
                     <p>Position: {position}</p>"
                ),
            )
        }
        ReminderAudience::Candidate => (
            format!("Upcoming Interview Reminder: {position}"),
            format!(
                "<p>You have an upcoming interview for <strong>{position}</strong></p>\
                 <p>Interviewer: {}</p>",
                details.interviewer_name.unwrap_or("Not assigned")
            ),
        ),
    };

    Email {
        to: vec![to.to_string()],
        subject,
        html: format!(
            "{lead}<p>Scheduled for: {when}</p><p><a href=\"{join_url}\">Join Interview</a></p>"
        ),
        text: None,
        reply_to: None,
    }
}
