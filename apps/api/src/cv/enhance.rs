use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::cv::prompts::ENHANCE_PROMPT;
use crate::llm_client::prompts::render;
use crate::llm_client::{parse_llm_json, LlmError};

#[derive(Debug, Deserialize)]
pub struct EnhancedExperience {
    pub id: Value,
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Enhancement {
    pub summary: Option<String>,
    #[serde(default)]
    pub experiences: Vec<EnhancedExperience>,
}

fn str_at<'a>(cv: &'a Value, pointer: &str) -> &'a str {
    cv.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

pub fn enhance_prompt(cv: &Value) -> String {
    let experiences = cv
        .get("experiences")
        .map(Value::to_string)
        .unwrap_or_else(|| "[]".to_string());
    let skills = cv
        .get("skills")
        .and_then(Value::as_array)
        .map(|s| {
            s.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    render(
        ENHANCE_PROMPT,
        &[
            ("name", str_at(cv, "/personalInfo/fullName")),
            ("summary", str_at(cv, "/summary")),
            ("experiences", &experiences),
            ("skills", &skills),
        ],
    )
}

/// Applies the rewritten summary and experience descriptions. Experiences
/// are matched by `id`; everything else in the document is untouched.
pub fn merge_enhancement(mut cv: Value, enhancement: Enhancement) -> Value {
    if let Some(summary) = enhancement.summary.filter(|s| !s.trim().is_empty()) {
        if let Some(obj) = cv.as_object_mut() {
            obj.insert("summary".to_string(), Value::String(summary));
        }
    }
    if let Some(experiences) = cv.get_mut("experiences").and_then(Value::as_array_mut) {
        for exp in experiences.iter_mut() {
            let Some(id) = exp.get("id").cloned() else {
                continue;
            };
            if let Some(rewrite) = enhancement.experiences.iter().find(|e| e.id == id) {
                if let Some(obj) = exp.as_object_mut() {
                    obj.insert(
                        "description".to_string(),
                        Value::String(rewrite.description.clone()),
                    );
                }
            }
        }
    }
    cv
}

/// An unparseable reply or an overloaded backend returns the CV unchanged.
pub fn enhanced_cv(cv: Value, outcome: Result<String, LlmError>) -> Result<Value, LlmError> {
    match outcome {
        Ok(text) => match parse_llm_json::<Enhancement>(&text) {
            Ok(enhancement) => Ok(merge_enhancement(cv, enhancement)),
            Err(e) => {
                warn!("CV enhancement JSON parse failed, returning original: {e}");
                Ok(cv)
            }
        },
        Err(e) if e.is_overloaded() => {
            warn!("CV enhancement backend unavailable, returning original: {e}");
            Ok(cv)
        }
        Err(e) => Err(e),
    }
}
