/// LLM client: the single point of entry for all model calls in JobPrep.
///
/// No other module talks to Ollama or OpenAI directly. Handlers build a prompt,
/// call `call` / `call_json`, and decide on their own fallback payloads.
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProvider};

pub mod json_repair;
pub mod prompts;

pub use json_repair::clean_json_response;

const MAX_RETRIES: u32 = 3;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// True when the backend is overloaded or throttling us.
    /// Callers answer these with a canned payload instead of a 500.
    pub fn is_overloaded(&self) -> bool {
        match self {
            LlmError::Api { status, message } => {
                *status == 503 || *status == 429 || message.contains("overloaded")
            }
            LlmError::RateLimited { .. } => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// The single LLM client shared through `AppState`.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends one completion request and returns the raw model text.
    /// Retries on 429, 5xx and transport errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.config.provider {
                LlmProvider::Ollama => self.send_ollama(prompt, system).await,
                LlmProvider::OpenAi => self.send_openai(prompt, system).await,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let text = match self.config.provider {
                LlmProvider::Ollama => response.json::<OllamaResponse>().await?.response,
                LlmProvider::OpenAi => response
                    .json::<ChatResponse>()
                    .await?
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default(),
            };

            if text.trim().is_empty() {
                return Err(LlmError::EmptyContent);
            }

            debug!(
                "LLM call succeeded: model={}, chars={}",
                self.config.model,
                text.len()
            );

            return Ok(text);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the model and deserializes the cleaned-up text as JSON.
    /// The prompt must instruct the model to return JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.call(prompt, system).await?;
        parse_llm_json(&text)
    }

    async fn send_ollama(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let full_prompt = if system.is_empty() {
            prompt.to_string()
        } else {
            format!("{system}\n\n{prompt}")
        };
        let body = OllamaRequest {
            model: &self.config.model,
            prompt: full_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: TEMPERATURE,
                top_p: TOP_P,
            },
        };
        self.client
            .post(format!(
                "{}/api/generate",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&body)
            .send()
            .await
    }

    async fn send_openai(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let body = ChatRequest {
            model: &self.config.model,
            temperature: TEMPERATURE,
            messages,
        };
        self.client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
    }
}

/// Cleans raw model output and parses it as `T`.
pub fn parse_llm_json<T: DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let cleaned = clean_json_response(raw);
    serde_json::from_str(&cleaned).map_err(LlmError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Score {
        score: u32,
    }

    #[test]
    fn test_parse_llm_json_with_fences_and_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"score\": 7,}\n```\nGood luck.";
        let parsed: Score = parse_llm_json(raw).unwrap();
        assert_eq!(parsed.score, 7);
    }

    #[test]
    fn test_parse_llm_json_rejects_prose() {
        let result: Result<Score, _> = parse_llm_json("I cannot answer that.");
        assert!(matches!(result, Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_overloaded_detection() {
        assert!(LlmError::Api {
            status: 503,
            message: String::new()
        }
        .is_overloaded());
        assert!(LlmError::Api {
            status: 500,
            message: "model is overloaded".into()
        }
        .is_overloaded());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_overloaded());
        assert!(!LlmError::EmptyContent.is_overloaded());
    }
}
