use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::prompts::{DEFAULT_CRITERIA, EVALUATION_PROMPT};
use crate::errors::AppError;
use crate::llm_client::prompts::render;
use crate::llm_client::{parse_llm_json, LlmError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub question: Option<String>,
    pub user_answer: Option<String>,
    pub ideal_answer: Option<String>,
    pub evaluation_criteria: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub key_points_covered: Vec<String>,
    #[serde(default)]
    pub key_points_missed: Vec<String>,
}

impl Evaluation {
    fn canned(strength: &str, weakness: &str, suggestion: &str, feedback: &str) -> Self {
        Self {
            score: 5.0,
            strengths: vec![strength.to_string()],
            weaknesses: vec![weakness.to_string()],
            suggestions: vec![suggestion.to_string()],
            feedback: feedback.to_string(),
            key_points_covered: vec![],
            key_points_missed: vec![],
        }
    }

    /// Returned when the model's reply cannot be parsed.
    pub fn parse_fallback() -> Self {
        Self::canned(
            "Answer provided",
            "Unable to evaluate properly due to parsing error",
            "Please try answering again",
            "Technical error occurred during evaluation",
        )
    }

    /// Returned when the backend is overloaded or throttling.
    pub fn unavailable_fallback(rate_limited: bool) -> Self {
        Self::canned(
            "Answer submitted",
            "Evaluation service temporarily unavailable",
            "Your answer has been recorded",
            if rate_limited {
                "Rate limit reached. Your answer is saved."
            } else {
                "AI evaluation service is currently overloaded. Your answer is saved and will be reviewed."
            },
        )
    }
}

pub struct EvaluationInput {
    pub question: String,
    pub user_answer: String,
    pub ideal_answer: String,
    pub criteria: Option<Vec<String>>,
}

pub fn validate(req: EvaluateRequest) -> Result<EvaluationInput, AppError> {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    match (
        non_empty(req.question),
        non_empty(req.user_answer),
        non_empty(req.ideal_answer),
    ) {
        (Some(question), Some(user_answer), Some(ideal_answer)) => Ok(EvaluationInput {
            question,
            user_answer,
            ideal_answer,
            criteria: req.evaluation_criteria.filter(|c| !c.is_empty()),
        }),
        _ => Err(AppError::Validation(
            "Question, user answer, and ideal answer are required".to_string(),
        )),
    }
}

pub fn evaluation_prompt(input: &EvaluationInput) -> String {
    let criteria = input
        .criteria
        .as_ref()
        .map(|c| c.join(", "))
        .unwrap_or_else(|| DEFAULT_CRITERIA.to_string());
    render(
        EVALUATION_PROMPT,
        &[
            ("question", &input.question),
            ("ideal", &input.ideal_answer),
            ("answer", &input.user_answer),
            ("criteria", &criteria),
        ],
    )
}

fn is_rate_limited(error: &LlmError) -> bool {
    matches!(
        error,
        LlmError::RateLimited { .. } | LlmError::Api { status: 429, .. }
    )
}

/// Turns the raw LLM outcome into the response body. Parse failures and
/// overload errors become canned evaluations; other errors propagate.
pub fn evaluation_from(outcome: Result<String, LlmError>) -> Result<Evaluation, LlmError> {
    match outcome {
        Ok(text) => match parse_llm_json::<Evaluation>(&text) {
            Ok(mut evaluation) => {
                evaluation.score = evaluation.score.clamp(0.0, 10.0);
                Ok(evaluation)
            }
            Err(e) => {
                warn!("Evaluation JSON parse failed: {e}");
                Ok(Evaluation::parse_fallback())
            }
        },
        Err(e) if e.is_overloaded() => {
            warn!("Evaluation backend unavailable: {e}");
            Ok(Evaluation::unavailable_fallback(is_rate_limited(&e)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_reply_falls_back() {
        let evaluation = evaluation_from(Ok("I think it was a decent answer.".into())).unwrap();
        assert_eq!(evaluation, Evaluation::parse_fallback());
        assert_eq!(evaluation.score, 5.0);
        assert_eq!(
            evaluation.weaknesses,
            vec!["Unable to evaluate properly due to parsing error"]
        );
    }

    #[test]
    fn test_fenced_reply_parses_and_clamps() {
        let raw = "```json\n{\"score\": 14, \"strengths\": [\"concise\"], \"feedback\": \"ok\",}\n```";
        let evaluation = evaluation_from(Ok(raw.into())).unwrap();
        assert_eq!(evaluation.score, 10.0);
        assert_eq!(evaluation.strengths, vec!["concise"]);
        assert!(evaluation.key_points_missed.is_empty());
    }

    #[test]
    fn test_overload_and_rate_limit_fallbacks() {
        let overloaded = evaluation_from(Err(LlmError::Api {
            status: 503,
            message: "model overloaded".into(),
        }))
        .unwrap();
        assert!(overloaded.feedback.starts_with("AI evaluation service is currently overloaded"));

        let limited = evaluation_from(Err(LlmError::Api {
            status: 429,
            message: String::new(),
        }))
        .unwrap();
        assert_eq!(limited.feedback, "Rate limit reached. Your answer is saved.");
    }

    #[test]
    fn test_other_errors_propagate() {
        let result = evaluation_from(Err(LlmError::Api {
            status: 400,
            message: "bad model".into(),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_uses_default_criteria() {
        let input = validate(EvaluateRequest {
            question: Some("What is a mutex?".into()),
            user_answer: Some("A lock".into()),
            ideal_answer: Some("A mutual exclusion primitive".into()),
            evaluation_criteria: Some(vec![]),
        })
        .unwrap();
        let prompt = evaluation_prompt(&input);
        assert!(prompt.contains("EVALUATION CRITERIA: Accuracy, completeness, clarity"));
        assert!(prompt.contains("CANDIDATE'S ANSWER: A lock"));
    }

    #[test]
    fn test_validate_requires_all_fields() {
        let result = validate(EvaluateRequest {
            question: Some("Q".into()),
            user_answer: None,
            ideal_answer: Some("A".into()),
            evaluation_criteria: None,
        });
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
