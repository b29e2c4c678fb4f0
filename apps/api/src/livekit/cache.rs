//! Room token cache and reconnect helper.
//!
//! `TokenCache` is an owned object shared through `Arc`; callers that need
//! tokens for the same room get the cached one until it is within
//! `EXPIRY_BUFFER_SECS` of expiring. Concurrent misses for one room share a
//! single in-flight fetch.
//!
//! The API only drives the cache through `RecorderTokenSource` for Egress
//! calls. `HttpTokenSource` and `Reconnector` are the room-client side of the
//! same contract (fetching from `/api/livekit/token` and re-joining a dropped
//! room) and are not called by any handler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::livekit::token::{decode_expiry, TokenError, TokenMinter};

pub const EXPIRY_BUFFER_SECS: i64 = 60;
pub const MAX_FETCH_ATTEMPTS: u32 = 3;
pub const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Where fresh tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, room: &str) -> Result<String, TokenError>;
}

/// Mints recorder tokens locally with the API secret.
pub struct RecorderTokenSource {
    minter: TokenMinter,
}

impl RecorderTokenSource {
    pub fn new(minter: TokenMinter) -> Self {
        Self { minter }
    }
}

#[async_trait]
impl TokenSource for RecorderTokenSource {
    async fn fetch(&self, room: &str) -> Result<String, TokenError> {
        self.minter.recorder_token(room)
    }
}

/// Fetches participant tokens from a `/api/livekit/token` endpoint.
#[allow(dead_code)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    endpoint: String,
    participant_name: String,
    session_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[allow(dead_code)]
impl HttpTokenSource {
    pub fn new(
        endpoint: impl Into<String>,
        participant_name: impl Into<String>,
        session_token: Option<String>,
    ) -> Result<Self, TokenError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            participant_name: participant_name.into(),
            session_token,
        })
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self, room: &str) -> Result<String, TokenError> {
        let mut req = self.client.post(&self.endpoint).json(&json!({
            "roomName": room,
            "participantName": self.participant_name,
        }));
        if let Some(token) = &self.session_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TokenError::Fetch(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TokenError::Fetch(format!("token endpoint returned {status}")));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenError::Fetch(e.to_string()))?;
        Ok(body.token)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at > now + EXPIRY_BUFFER_SECS
    }
}

pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    entries: Mutex<HashMap<String, CachedToken>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<CachedToken>>>>,
    retry_delay: Duration,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            retry_delay: FETCH_RETRY_DELAY,
        }
    }

    pub async fn get_token(&self, room: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        if let Some(cached) = self.entries.lock().await.get(room) {
            if cached.is_fresh(now) {
                debug!("Using cached LiveKit token for room {room}");
                return Ok(cached.token.clone());
            }
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(room.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.fetch_with_retry(room))
            .await
            .cloned();

        let mut in_flight = self.in_flight.lock().await;
        if let Ok(fresh) = &result {
            self.entries
                .lock()
                .await
                .insert(room.to_string(), fresh.clone());
        }
        if in_flight
            .get(room)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(room);
        }

        result.map(|t| t.token)
    }

    pub async fn clear(&self, room: &str) {
        self.entries.lock().await.remove(room);
    }

    async fn fetch_with_retry(&self, room: &str) -> Result<CachedToken, TokenError> {
        let mut attempt = 1;
        loop {
            debug!("Fetching LiveKit token for {room} (attempt {attempt}/{MAX_FETCH_ATTEMPTS})");
            let outcome = match self.source.fetch(room).await {
                Ok(token) => decode_expiry(&token).map(|expires_at| CachedToken { token, expires_at }),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(cached) => {
                    info!("LiveKit token obtained for room {room}");
                    return Ok(cached);
                }
                Err(e) if attempt < MAX_FETCH_ATTEMPTS => {
                    warn!("Token fetch attempt {attempt} for {room} failed: {e}; retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Giving up on LiveKit token for {room} after {attempt} attempts");
                    return Err(e);
                }
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconnectError {
    #[error("gave up after {attempts} reconnect attempts: {last_error}")]
    GaveUp { attempts: u32, last_error: String },
}

/// Retries a connection with exponential backoff (2^n seconds before
/// attempt n). The attempt counter persists across calls until `reset`.
#[allow(dead_code)]
pub struct Reconnector {
    attempts: u32,
    max_attempts: u32,
    connect_timeout: Duration,
}

impl Default for Reconnector {
    fn default() -> Self {
        Self {
            attempts: 0,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

#[allow(dead_code)]
impl Reconnector {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub async fn reconnect_with_backoff<F, Fut, T, E>(
        &mut self,
        mut connect: F,
    ) -> Result<T, ReconnectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = String::from("no attempts left");
        while self.attempts < self.max_attempts {
            self.attempts += 1;
            let delay = Duration::from_secs(1 << self.attempts);
            info!(
                "Reconnecting (attempt {}/{}) in {:?}",
                self.attempts, self.max_attempts, delay
            );
            tokio::time::sleep(delay).await;

            match tokio::time::timeout(self.connect_timeout, connect()).await {
                Ok(Ok(conn)) => return Ok(conn),
                Ok(Err(e)) => {
                    warn!("Reconnection attempt {} failed: {e}", self.attempts);
                    last_error = e.to_string();
                }
                Err(_) => {
                    warn!("Reconnection attempt {} timed out", self.attempts);
                    last_error = format!("connection timeout ({}s)", self.connect_timeout.as_secs());
                }
            }
        }

        Err(ReconnectError::GaveUp {
            attempts: self.attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::config::LiveKitConfig;

    fn minter() -> TokenMinter {
        TokenMinter::new(&LiveKitConfig {
            url: "wss://example.livekit.cloud".into(),
            api_key: "APIkey".into(),
            api_secret: "livekit-secret-livekit-secret-123".into(),
        })
    }

    /// Counts fetches and fails the first `failures` of them.
    struct CountingSource {
        minter: TokenMinter,
        calls: AtomicU32,
        failures: u32,
        delay: Duration,
    }

    impl CountingSource {
        fn new(failures: u32, delay: Duration) -> Self {
            Self {
                minter: minter(),
                calls: AtomicU32::new(0),
                failures,
                delay,
            }
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self, room: &str) -> Result<String, TokenError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if n <= self.failures {
                return Err(TokenError::Fetch(format!("failure {n}")));
            }
            self.minter.participant_token(room, "tester", None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_fetch() {
        let source = Arc::new(CountingSource::new(0, Duration::from_millis(500)));
        let cache = Arc::new(TokenCache::new(source.clone()));

        let (a, b) = tokio::join!(cache.get_token("room-1"), cache.get_token("room-1"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Still fresh: served from the cache.
        cache.get_token("room-1").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rooms_are_cached_separately_and_clear_forces_refetch() {
        let source = Arc::new(CountingSource::new(0, Duration::ZERO));
        let cache = TokenCache::new(source.clone());

        cache.get_token("a").await.unwrap();
        cache.get_token("b").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        cache.clear("a").await;
        cache.get_token("a").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_then_succeeds() {
        let source = Arc::new(CountingSource::new(2, Duration::ZERO));
        let cache = TokenCache::new(source.clone());

        let start = tokio::time::Instant::now();
        cache.get_token("room").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure, 4s after the second.
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_gives_up_after_three_attempts() {
        let source = Arc::new(CountingSource::new(10, Duration::ZERO));
        let cache = TokenCache::new(source.clone());

        assert!(cache.get_token("room").await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), MAX_FETCH_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_nearly_expired_token_is_refetched() {
        struct ShortLived(AtomicU32);

        #[async_trait]
        impl TokenSource for ShortLived {
            async fn fetch(&self, _room: &str) -> Result<String, TokenError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                let exp = Utc::now().timestamp() + 30;
                let payload = base64::Engine::encode(
                    &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                    format!("{{\"exp\":{exp}}}"),
                );
                Ok(format!("header.{payload}.sig"))
            }
        }

        let source = Arc::new(ShortLived(AtomicU32::new(0)));
        let cache = TokenCache::new(source.clone());
        cache.get_token("room").await.unwrap();
        cache.get_token("room").await.unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_and_give_up() {
        let mut reconnector = Reconnector::default();
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = reconnector
            .reconnect_with_backoff(|| async { Err::<(), _>("refused") })
            .await;

        assert_eq!(
            result,
            Err(ReconnectError::GaveUp {
                attempts: 5,
                last_error: "refused".to_string()
            })
        );
        // 2 + 4 + 8 + 16 + 32 seconds of backoff.
        assert!(start.elapsed() >= Duration::from_secs(62));

        // Exhausted until reset.
        let again: Result<(), _> = reconnector
            .reconnect_with_backoff(|| async { Ok::<(), String>(()) })
            .await;
        assert!(again.is_err());

        reconnector.reset();
        let ok = reconnector
            .reconnect_with_backoff(|| async { Ok::<u8, String>(7) })
            .await;
        assert_eq!(ok, Ok(7));
        assert_eq!(reconnector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempt_times_out() {
        let mut reconnector = Reconnector::default();
        let calls = AtomicU32::new(0);

        let result = reconnector
            .reconnect_with_backoff(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<u32, String>(n)
                }
            })
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(reconnector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_http_source_against_local_endpoint() {
        use axum::{routing::post, Json, Router};

        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/livekit/token",
            post(move |Json(body): Json<serde_json::Value>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let room = body["roomName"].as_str().unwrap_or_default().to_string();
                    let token = minter().participant_token(&room, "remote", None).unwrap();
                    Json(json!({ "token": token }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = HttpTokenSource::new(
            format!("http://{addr}/api/livekit/token"),
            "remote",
            None,
        )
        .unwrap();
        let cache = TokenCache::new(Arc::new(source));

        let first = cache.get_token("standup").await.unwrap();
        let second = cache.get_token("standup").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
