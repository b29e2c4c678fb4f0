//! CV text extraction from uploaded files.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::cv::prompts::STRUCTURE_PROMPT;
use crate::errors::AppError;
use crate::llm_client::prompts::render;
use crate::llm_client::{parse_llm_json, LlmError};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MIN_TEXT_CHARS: usize = 50;
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Decided by file extension, then by content type.
    pub fn detect(file_name: Option<&str>, content_type: Option<&str>) -> Option<Self> {
        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match (ext.as_deref(), content_type) {
            (Some("pdf"), _) | (None, Some("application/pdf")) => Some(Self::Pdf),
            (Some("txt"), _) | (None, Some("text/plain")) => Some(Self::Text),
            _ => None,
        }
    }
}

/// Normalises line endings and collapses runs of blank lines.
pub fn clean_text(raw: &str) -> String {
    let unix = raw.replace("\r\n", "\n");
    let mut out = String::with_capacity(unix.len());
    let mut newlines = 0;
    for c in unix.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
        } else {
            newlines = 0;
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// CPU-bound for PDFs; call from a blocking task.
pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String, AppError> {
    let raw = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            warn!("PDF extraction failed: {e}");
            AppError::Validation(
                "Failed to parse PDF. Please try pasting your CV text instead.".to_string(),
            )
        })?,
        DocumentKind::Text => String::from_utf8_lossy(bytes).into_owned(),
    };
    let text = clean_text(&raw);
    if text.chars().count() < MIN_TEXT_CHARS {
        return Err(AppError::Validation(
            "Could not extract text from file. Please try pasting your CV text instead."
                .to_string(),
        ));
    }
    Ok(text)
}

pub fn structure_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    render(STRUCTURE_PROMPT, &[("text", &excerpt)])
}

#[derive(Debug, Serialize)]
pub struct ExtractedCv {
    pub success: bool,
    pub text: String,
    pub length: usize,
    /// Structured CV, absent when the model could not produce one.
    pub data: Option<Value>,
}

/// Structuring is best-effort: the extracted text is returned either way.
pub fn extracted_cv(text: String, outcome: Result<String, LlmError>) -> ExtractedCv {
    let data = match outcome {
        Ok(raw) => match parse_llm_json::<Value>(&raw) {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!("CV structuring JSON parse failed: {e}");
                None
            }
        },
        Err(e) => {
            warn!("CV structuring unavailable: {e}");
            None
        }
    };
    ExtractedCv {
        success: true,
        length: text.chars().count(),
        text,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(DocumentKind::detect(Some("CV.PDF"), None), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::detect(Some("cv.txt"), Some("application/pdf")), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::detect(None, Some("application/pdf")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::detect(Some("cv.docx"), None), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a\r\nb\n\n\n\n\nc  \n"), "a\nb\n\nc");
    }

    #[test]
    fn test_short_text_rejected() {
        let result = extract_text(DocumentKind::Text, b"Jane Doe\nEngineer");
        assert!(matches!(result, Err(AppError::Validation(_))));

        let long = "Jane Doe, Senior Engineer. Ten years building distributed systems in Rust.";
        assert_eq!(extract_text(DocumentKind::Text, long.as_bytes()).unwrap(), long);
    }

    #[test]
    fn test_structuring_is_best_effort() {
        let text = "x".repeat(60);
        let out = extracted_cv(text.clone(), Ok(r#"{"summary": "Engineer", "skills": ["Rust"]}"#.into()));
        assert_eq!(out.data.unwrap()["skills"][0], "Rust");

        let out = extracted_cv(text.clone(), Ok("no json here".into()));
        assert!(out.data.is_none());
        assert_eq!(out.length, 60);
        assert_eq!(out.text, text);
    }
}
