//! Client for the historical event query service.
//!
//! The service is read-only here: events are recorded elsewhere and this
//! client only lists them, lists known users and fetches per-user averages.

use crate::protocol::types::timestamp_serde;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query service configuration.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Base URL, e.g. `http://localhost:8000`
    pub base_url: String,
    pub timeout: Duration,
}

impl HistoryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn root_url(&self) -> String {
        format!("{}/", self.base_url)
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    pub fn event_url(&self, id: i64) -> String {
        format!("{}/events/{id}", self.base_url)
    }

    pub fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }

    pub fn stats_url(&self, user_id: &str) -> String {
        format!("{}/stats/{user_id}", self.base_url)
    }
}

/// Query client error types.
#[derive(Debug)]
pub enum HistoryError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// Response body did not match the expected shape
    Serialization(String),
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Config(msg) => write!(f, "History config error: {msg}"),
            HistoryError::Network(msg) => write!(f, "History network error: {msg}"),
            HistoryError::Server { status, message } => {
                write!(f, "History server error ({status}): {message}")
            }
            HistoryError::Serialization(msg) => write!(f, "History serialization error: {msg}"),
        }
    }
}

impl std::error::Error for HistoryError {}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub id: i64,
    #[serde(with = "timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    /// Activity context the event was recorded in (meeting, study, ...)
    pub mode: String,
    pub focus_score: f64,
    pub load_score: f64,
    pub anomaly_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Filter for listing events. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub user_id: Option<String>,
    pub mode: Option<String>,
    pub limit: u32,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            mode: None,
            limit: 100,
        }
    }
}

impl EventQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Query-string pairs, omitting unset filters.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(user_id) = &self.user_id {
            params.push(("user_id", user_id.clone()));
        }
        if let Some(mode) = &self.mode {
            params.push(("mode", mode.clone()));
        }
        params.push(("limit", self.limit.to_string()));
        params
    }
}

/// Per-user averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_events: u64,
    pub avg_focus: f64,
    pub avg_load: f64,
    pub avg_anomaly: f64,
}

/// Service banner returned by the root endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiInfo {
    pub message: String,
    pub version: String,
}

/// Async client for the query service.
pub struct HistoryClient {
    config: HistoryConfig,
    client: reqwest::Client,
}

impl HistoryClient {
    pub fn new(config: HistoryConfig) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HistoryError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Check the service is reachable.
    pub async fn health(&self) -> Result<ApiInfo, HistoryError> {
        self.get_json(self.config.root_url(), &[]).await
    }

    pub async fn events(&self, query: &EventQuery) -> Result<Vec<HistoricalEvent>, HistoryError> {
        self.get_json(self.config.events_url(), &query.params())
            .await
    }

    pub async fn event(&self, id: i64) -> Result<HistoricalEvent, HistoryError> {
        self.get_json(self.config.event_url(id), &[]).await
    }

    pub async fn users(&self) -> Result<Vec<String>, HistoryError> {
        self.get_json(self.config.users_url(), &[]).await
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats, HistoryError> {
        self.get_json(self.config.stats_url(user_id), &[]).await
    }

    async fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        url: String,
        params: &[(&'static str, String)],
    ) -> Result<R, HistoryError> {
        tracing::debug!(%url, "history query");
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| HistoryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(HistoryError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HistoryError::Serialization(e.to_string()))
    }
}

/// Blocking query client for use in synchronous contexts.
pub struct BlockingHistoryClient {
    inner: HistoryClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingHistoryClient {
    pub fn new(config: HistoryConfig) -> Result<Self, HistoryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HistoryError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: HistoryClient::new(config)?,
            runtime,
        })
    }

    pub fn health(&self) -> Result<ApiInfo, HistoryError> {
        self.runtime.block_on(self.inner.health())
    }

    pub fn events(&self, query: &EventQuery) -> Result<Vec<HistoricalEvent>, HistoryError> {
        self.runtime.block_on(self.inner.events(query))
    }

    pub fn event(&self, id: i64) -> Result<HistoricalEvent, HistoryError> {
        self.runtime.block_on(self.inner.event(id))
    }

    pub fn users(&self) -> Result<Vec<String>, HistoryError> {
        self.runtime.block_on(self.inner.users())
    }

    pub fn user_stats(&self, user_id: &str) -> Result<UserStats, HistoryError> {
        self.runtime.block_on(self.inner.user_stats(user_id))
    }
}
