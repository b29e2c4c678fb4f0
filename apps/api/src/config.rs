use anyhow::{Context, Result};
use serde::Serialize;

/// Which LLM backend serves AI features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_monthly: Option<String>,
    pub price_yearly: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub resend_api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct CodeExecutionConfig {
    pub judge0_url: String,
    pub judge0_api_key: Option<String>,
    pub use_rapid_api: bool,
    pub piston_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
///
/// Only `DATABASE_URL` is required. Every integration is an optional group:
/// a group that is missing any of its keys is `None` and the matching
/// endpoints answer with an "is not configured" error.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub port: u16,
    pub rust_log: String,
    pub llm: LlmConfig,
    pub stripe: Option<StripeConfig>,
    pub google: Option<GoogleConfig>,
    pub livekit: Option<LiveKitConfig>,
    pub email: EmailConfig,
    pub code_execution: CodeExecutionConfig,
    pub storage: Option<StorageConfig>,
}

/// Feature flags reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    pub ai: bool,
    pub billing: bool,
    pub calendar: bool,
    pub video: bool,
    pub email: bool,
    pub code_execution: bool,
    pub storage: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let provider = match optional_env("LLM_PROVIDER").as_deref() {
            Some("openai") => LlmProvider::OpenAi,
            _ => LlmProvider::Ollama,
        };
        let llm = match provider {
            LlmProvider::Ollama => LlmConfig {
                provider,
                base_url: optional_env("OLLAMA_BASE_URL")
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
                model: optional_env("OLLAMA_MODEL")
                    .unwrap_or_else(|| "llama3.2:latest".to_string()),
                api_key: None,
            },
            LlmProvider::OpenAi => LlmConfig {
                provider,
                base_url: optional_env("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: optional_env("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                api_key: Some(require_env("OPENAI_API_KEY")?),
            },
        };

        let stripe = match (
            optional_env("STRIPE_SECRET_KEY"),
            optional_env("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
                price_monthly: optional_env("STRIPE_PRICE_MONTHLY"),
                price_yearly: optional_env("STRIPE_PRICE_YEARLY"),
            }),
            _ => None,
        };

        let google = match (
            optional_env("GOOGLE_CLIENT_ID"),
            optional_env("GOOGLE_CLIENT_SECRET"),
            optional_env("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        let livekit = match (
            optional_env("LIVEKIT_URL"),
            optional_env("LIVEKIT_API_KEY"),
            optional_env("LIVEKIT_API_SECRET"),
        ) {
            (Some(url), Some(api_key), Some(api_secret)) => Some(LiveKitConfig {
                url,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let storage = match (
            optional_env("S3_BUCKET"),
            optional_env("AWS_ACCESS_KEY_ID"),
            optional_env("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(access_key_id), Some(secret_access_key)) => Some(StorageConfig {
                bucket,
                endpoint: optional_env("S3_ENDPOINT"),
                region: optional_env("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            app_url: optional_env("APP_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            llm,
            stripe,
            google,
            livekit,
            email: EmailConfig {
                resend_api_key: optional_env("RESEND_API_KEY"),
                from: optional_env("EMAIL_FROM")
                    .unwrap_or_else(|| "JobPrep <noreply@jobprep.app>".to_string()),
            },
            code_execution: CodeExecutionConfig {
                judge0_url: optional_env("JUDGE0_API_URL")
                    .unwrap_or_else(|| "https://judge0-ce.p.rapidapi.com".to_string()),
                judge0_api_key: optional_env("JUDGE0_API_KEY"),
                use_rapid_api: optional_env("USE_RAPID_API").as_deref() == Some("true"),
                piston_url: optional_env("PISTON_API_URL"),
            },
            storage,
        })
    }

    pub fn features(&self) -> FeatureStatus {
        FeatureStatus {
            ai: match self.llm.provider {
                LlmProvider::Ollama => true,
                LlmProvider::OpenAi => self.llm.api_key.is_some(),
            },
            billing: self.stripe.is_some(),
            calendar: self.google.is_some(),
            video: self.livekit.is_some(),
            email: self.email.resend_api_key.is_some(),
            code_execution: self.code_execution.judge0_api_key.is_some()
                || self.code_execution.piston_url.is_some(),
            storage: self.storage.is_some(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/jobprep_test".to_string(),
        app_url: "http://localhost:3000".to_string(),
        port: 8080,
        rust_log: "info".to_string(),
        llm: LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            api_key: None,
        },
        stripe: Some(StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_monthly: Some("price_monthly".to_string()),
            price_yearly: Some("price_yearly".to_string()),
        }),
        google: None,
        livekit: Some(LiveKitConfig {
            url: "wss://jobprep.livekit.cloud".to_string(),
            api_key: "APIkey".to_string(),
            api_secret: "livekit-secret-livekit-secret-123".to_string(),
        }),
        email: EmailConfig {
            resend_api_key: None,
            from: "JobPrep <noreply@jobprep.app>".to_string(),
        },
        code_execution: CodeExecutionConfig {
            judge0_url: "https://judge0-ce.p.rapidapi.com".to_string(),
            judge0_api_key: None,
            use_rapid_api: false,
            piston_url: None,
        },
        storage: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_reflect_configured_groups() {
        let config = test_config();
        let features = config.features();
        assert!(features.ai);
        assert!(features.billing);
        assert!(!features.calendar);
        assert!(features.video);
        assert!(!features.email);
        assert!(!features.code_execution);
        assert!(!features.storage);
    }

    #[test]
    fn test_openai_without_key_is_not_ai_enabled() {
        let mut config = test_config();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;
        assert!(!config.features().ai);
    }
}
