//! HTTP-backed [`TerritoryStore`] for the upload/storage service.
//!
//! Fetches a period's activities and the scope's users as JSON:
//! - `GET {base}/activities?month=YYYY-MM[&group=ID]` (no `month` for all-time)
//! - `GET {base}/users[?group=ID]`
//!
//! Requests share one pooled client. Rate limiting (429) and transport errors
//! are retried with exponential backoff; anything else fails the query.

use std::time::{Duration, Instant};

use base64::Engine;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::service::TerritoryStore;
use crate::{Activity, Period, Scope, TerritoryError, UserProfile};

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStoreConfig {
    /// API root, e.g. `https://paint.example.com/api`
    pub base_url: String,
    /// Sent as HTTP Basic credentials (`API_KEY:<key>`) when set
    pub api_key: Option<String>,
    /// Per-request timeout. Default: 30s
    pub timeout_secs: u64,
    /// Retries after the first attempt. Default: 3
    pub max_retries: u32,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// [`TerritoryStore`] over the storage service's JSON API.
pub struct HttpStore {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
    max_retries: u32,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, TerritoryError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TerritoryError::Config("base_url must not be empty".to_string()));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TerritoryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let auth_header = config.api_key.map(|key| {
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("API_KEY:{}", key));
            format!("Basic {}", encoded)
        });

        Ok(Self {
            client,
            base_url,
            auth_header,
            max_retries: config.max_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, TerritoryError> {
        let url = format!("{}/{}", self.base_url, path);
        let start = Instant::now();
        let mut retries = 0;

        loop {
            let mut request = self.client.get(&url).query(query);
            if let Some(auth) = &self.auth_header {
                request = request.header("Authorization", auth);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.max_retries {
                            return Err(TerritoryError::SourceUnavailable(format!(
                                "{}: max retries exceeded (429)",
                                path
                            )));
                        }
                        let wait = rate_limit_backoff(retries);
                        warn!("[HttpStore] {} 429 Too Many Requests, retry {} after {:?}", path, retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(TerritoryError::SourceUnavailable(format!("{}: HTTP {}", path, status)));
                    }

                    let bytes = resp.bytes().await.map_err(|e| {
                        TerritoryError::SourceUnavailable(format!("{}: body download error: {}", path, e))
                    })?;
                    let data: T = serde_json::from_slice(&bytes)
                        .map_err(|e| TerritoryError::MalformedPayload(format!("{}: {}", path, e)))?;

                    info!(
                        "[HttpStore] GET {} -> {:.1}KB in {:?}",
                        path,
                        bytes.len() as f64 / 1024.0,
                        start.elapsed()
                    );
                    return Ok(data);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Err(TerritoryError::SourceUnavailable(format!(
                            "{}: request error: {}",
                            path, e
                        )));
                    }
                    let wait = transport_backoff(retries);
                    warn!("[HttpStore] {} error: {}, retry {} after {:?}", path, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl TerritoryStore for HttpStore {
    async fn activities_for_period(
        &self,
        period: &Period,
        scope: &Scope,
    ) -> Result<Vec<Activity>, TerritoryError> {
        let query = activities_query(period, scope);
        debug!("[HttpStore] Fetching activities for {} / {}", period, scope);
        self.get_json("activities", &query).await
    }

    async fn users_in_scope(&self, scope: &Scope) -> Result<Vec<UserProfile>, TerritoryError> {
        let query = scope_query(scope);
        debug!("[HttpStore] Fetching users for {}", scope);
        self.get_json("users", &query).await
    }
}

fn scope_query(scope: &Scope) -> Vec<(&'static str, String)> {
    scope
        .group_id()
        .map(|id| vec![("group", id.to_string())])
        .unwrap_or_default()
}

fn activities_query(period: &Period, scope: &Scope) -> Vec<(&'static str, String)> {
    let mut query: Vec<(&'static str, String)> =
        period.key().map(|key| ("month", key)).into_iter().collect();
    query.extend(scope_query(scope));
    query
}

/// Retries count from 1: 1s, 2s, 4s, then 4s for every later retry.
fn rate_limit_backoff(retry: u32) -> Duration {
    Duration::from_millis(500 * (1 << retry.min(3)))
}

/// Retries count from 1: 400ms, 800ms, 1.6s, then 3.2s for every later retry.
fn transport_backoff(retry: u32) -> Duration {
    Duration::from_millis(200 * (1 << retry.min(4)))
}
