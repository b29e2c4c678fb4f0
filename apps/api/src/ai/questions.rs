//! Streamed mock-interview question generation.
//!
//! Questions are generated one LLM call at a time and written to the client
//! as newline-delimited JSON, so the interview can start as soon as the first
//! question arrives. The stream is `init`, then one `question` line per
//! successful generation, then `complete` with the number actually produced.
//! A question whose generation fails is skipped, not retried.

use std::convert::Infallible;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ai::prompts::{BEHAVIORAL_QUESTION_PROMPT, TECHNICAL_QUESTION_PROMPT};
use crate::errors::AppError;
use crate::llm_client::prompts::{render, JSON_ONLY_SYSTEM};
use crate::llm_client::LlmClient;

pub const MAX_PER_KIND: u32 = 40;
pub const MIN_TOTAL: u32 = 5;
pub const MAX_TOTAL: u32 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionsRequest {
    pub job_description: Option<String>,
    pub employee_skills: Option<String>,
    pub technical_questions: Option<i64>,
    pub behavioral_questions: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Technical,
    Behavioral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    #[serde(default)]
    pub id: u32,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(default)]
    pub ideal_answer: String,
    #[serde(default)]
    pub evaluation_criteria: Vec<String>,
}

fn default_kind() -> QuestionKind {
    QuestionKind::Technical
}

/// One NDJSON line.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Init { total_questions: u32 },
    #[serde(rename_all = "camelCase")]
    Question {
        index: u32,
        question: GeneratedQuestion,
        received: u32,
        total: u32,
    },
    #[serde(rename_all = "camelCase")]
    Complete { total_questions: u32 },
}

impl StreamEvent {
    pub fn to_line(&self) -> Bytes {
        let mut line = serde_json::to_vec(self).unwrap_or_default();
        line.push(b'\n');
        Bytes::from(line)
    }
}

/// Validated generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPlan {
    pub job_description: String,
    pub skills: String,
    pub technical: u32,
    pub behavioral: u32,
}

impl QuestionPlan {
    pub fn total(&self) -> u32 {
        self.technical + self.behavioral
    }
}

/// Per-kind counts are clamped to 0..=40 (defaults 12 and 8); the total must
/// land in 5..=50.
pub fn plan_questions(req: GenerateQuestionsRequest) -> Result<QuestionPlan, AppError> {
    let (Some(job_description), Some(skills)) = (
        req.job_description.filter(|s| !s.trim().is_empty()),
        req.employee_skills.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Job description and employee skills are required".to_string(),
        ));
    };

    let clamp = |n: i64| n.clamp(0, MAX_PER_KIND as i64) as u32;
    let plan = QuestionPlan {
        job_description,
        skills,
        technical: clamp(req.technical_questions.unwrap_or(12)),
        behavioral: clamp(req.behavioral_questions.unwrap_or(8)),
    };

    if !(MIN_TOTAL..=MAX_TOTAL).contains(&plan.total()) {
        return Err(AppError::Validation(format!(
            "Total questions must be between {MIN_TOTAL} and {MAX_TOTAL}"
        )));
    }
    Ok(plan)
}

pub type LineSender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Runs the whole plan, writing each event to `tx`. Stops early once the
/// receiver is gone. Returns the number of questions produced.
pub async fn generate_into(llm: &LlmClient, plan: &QuestionPlan, tx: &LineSender) -> u32 {
    let total = plan.total();
    if tx
        .send(Ok(StreamEvent::Init {
            total_questions: total,
        }
        .to_line()))
        .await
        .is_err()
    {
        return 0;
    }

    let kinds = std::iter::repeat(QuestionKind::Technical)
        .take(plan.technical as usize)
        .chain(std::iter::repeat(QuestionKind::Behavioral).take(plan.behavioral as usize));

    let mut generated = 0u32;
    for (attempt, kind) in kinds.enumerate() {
        let id = generated + 1;
        let template = match kind {
            QuestionKind::Technical => TECHNICAL_QUESTION_PROMPT,
            QuestionKind::Behavioral => BEHAVIORAL_QUESTION_PROMPT,
        };
        let id_text = id.to_string();
        let prompt = render(
            template,
            &[
                ("job", &plan.job_description),
                ("skills", &plan.skills),
                ("id", &id_text),
            ],
        );

        let mut question = match llm.call_json::<GeneratedQuestion>(&prompt, JSON_ONLY_SYSTEM).await {
            Ok(q) => q,
            Err(e) => {
                warn!("Question {} ({:?}) generation failed: {e}", attempt + 1, kind);
                continue;
            }
        };
        question.id = id;
        question.kind = kind;

        let event = StreamEvent::Question {
            index: generated,
            question,
            received: id,
            total,
        };
        if tx.send(Ok(event.to_line())).await.is_err() {
            debug!("Client disconnected after {generated} questions");
            return generated;
        }
        generated += 1;
    }

    let _ = tx
        .send(Ok(StreamEvent::Complete {
            total_questions: generated,
        }
        .to_line()))
        .await;
    info!("Question stream complete: {generated}/{total} generated");
    generated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LlmConfig, LlmProvider};
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(tech: Option<i64>, beh: Option<i64>) -> GenerateQuestionsRequest {
        GenerateQuestionsRequest {
            job_description: Some("Backend engineer, Rust".into()),
            employee_skills: Some("tokio, axum".into()),
            technical_questions: tech,
            behavioral_questions: beh,
        }
    }

    #[test]
    fn test_plan_defaults_and_clamping() {
        let plan = plan_questions(request(None, None)).unwrap();
        assert_eq!((plan.technical, plan.behavioral), (12, 8));

        let plan = plan_questions(request(Some(45), Some(-3))).unwrap();
        assert_eq!((plan.technical, plan.behavioral), (40, 0));
    }

    #[test]
    fn test_plan_total_bounds() {
        assert!(plan_questions(request(Some(2), Some(2))).is_err());
        assert!(plan_questions(request(Some(40), Some(40))).is_err());
        assert!(plan_questions(request(Some(3), Some(2))).is_ok());
    }

    #[test]
    fn test_plan_requires_inputs() {
        let mut req = request(None, None);
        req.employee_skills = Some("  ".into());
        assert!(matches!(plan_questions(req), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_event_lines() {
        let line = StreamEvent::Init { total_questions: 3 }.to_line();
        assert_eq!(&line[..], b"{\"type\":\"init\",\"totalQuestions\":3}\n");

        let event = StreamEvent::Question {
            index: 0,
            question: GeneratedQuestion {
                id: 1,
                kind: QuestionKind::Behavioral,
                question: "Tell me about a time...".into(),
                ideal_answer: "STAR".into(),
                evaluation_criteria: vec!["clarity".into()],
            },
            received: 1,
            total: 3,
        };
        let value: Value = serde_json::from_slice(&event.to_line()).unwrap();
        assert_eq!(value["type"], "question");
        assert_eq!(value["question"]["type"], "behavioral");
        assert_eq!(value["question"]["idealAnswer"], "STAR");
    }

    /// Stub Ollama: every second call returns prose instead of JSON.
    async fn stub_llm() -> LlmClient {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/api/generate",
            post(move |Json(_): Json<Value>| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    let response = if n % 2 == 1 {
                        "Sorry, I cannot help with that.".to_string()
                    } else {
                        "```json\n{\"question\": \"Explain ownership\", \"idealAnswer\": \"moves\", \"evaluationCriteria\": [\"accuracy\"]}\n```".to_string()
                    };
                    Json(json!({ "response": response }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        LlmClient::new(LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: format!("http://{addr}"),
            model: "stub".into(),
            api_key: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_stream_skips_failed_questions() {
        let llm = stub_llm().await;
        let plan = QuestionPlan {
            job_description: "Rust".into(),
            skills: "tokio".into(),
            technical: 3,
            behavioral: 2,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let generated = generate_into(&llm, &plan, &tx).await;
        drop(tx);

        let mut lines = Vec::new();
        while let Some(Ok(bytes)) = rx.recv().await {
            lines.push(serde_json::from_slice::<Value>(&bytes).unwrap());
        }

        assert_eq!(generated, 3);
        assert_eq!(lines.first().unwrap()["type"], "init");
        assert_eq!(lines.first().unwrap()["totalQuestions"], 5);
        let questions: Vec<&Value> = lines.iter().filter(|l| l["type"] == "question").collect();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0]["question"]["id"], 1);
        assert_eq!(questions[1]["question"]["id"], 2);
        assert_eq!(questions[2]["question"]["type"], "behavioral");
        assert_eq!(lines.last().unwrap()["type"], "complete");
        assert_eq!(lines.last().unwrap()["totalQuestions"], 3);
    }
}
