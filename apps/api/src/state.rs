use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::billing::stripe::StripeClient;
use crate::calendar::google::GoogleCalendarClient;
use crate::challenges::runner::{runner_from_config, CodeRunner};
use crate::config::Config;
use crate::livekit::egress::LiveKitService;
use crate::llm_client::LlmClient;
use crate::notifications::mailer::Mailer;
use crate::recordings::storage::ObjectStorage;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Optional integrations are `None` when their configuration is absent;
/// handlers that need them answer 503.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub llm: LlmClient,
    pub mailer: Mailer,
    pub stripe: Option<StripeClient>,
    pub calendar: Option<GoogleCalendarClient>,
    pub livekit: Option<LiveKitService>,
    /// Judge0 when keyed, else Piston.
    pub code_runner: Option<Arc<dyn CodeRunner>>,
    pub storage: Option<ObjectStorage>,
}

impl AppState {
    pub async fn from_config(config: Config, db: PgPool) -> anyhow::Result<Self> {
        let llm = LlmClient::new(config.llm.clone())?;
        info!("LLM client initialized (model: {})", llm.model());

        let mailer = Mailer::new(config.email.clone())?;
        if mailer.is_dev_mode() {
            info!("RESEND_API_KEY not set, e-mails will be logged instead of sent");
        }

        let stripe = config.stripe.as_ref().map(StripeClient::new).transpose()?;
        let calendar = config
            .google
            .clone()
            .map(GoogleCalendarClient::new)
            .transpose()?;
        let livekit = config
            .livekit
            .as_ref()
            .map(|lk| LiveKitService::new(lk, config.storage.clone()))
            .transpose()?;
        let code_runner = runner_from_config(&config.code_execution)?;
        let storage = match &config.storage {
            Some(storage_config) => Some(ObjectStorage::new(storage_config).await),
            None => None,
        };

        info!("Integrations: {:?}", config.features());

        Ok(Self {
            db,
            config,
            llm,
            mailer,
            stripe,
            calendar,
            livekit,
            code_runner,
            storage,
        })
    }

    /// State over a lazy pool that never connects unless a query runs.
    #[cfg(test)]
    pub(crate) async fn for_tests() -> Self {
        let config = crate::config::test_config();
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool");
        Self::from_config(config, db).await.expect("test state")
    }
}
