//! Aspire REST API client: token exchange and paginated record fetch.

use crate::config::{AspireConfig, IdFilter, RetryConfig};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::sync::create_backoff;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Access token returned by the token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    #[serde(rename = "ClientId")]
    client_id: &'a str,
    #[serde(rename = "Secret")]
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "Token")]
    token: Option<String>,
}

/// One paginated fetch of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Data feed name
    pub entity: String,
    /// Column compared against `start_date` and used for ordering
    pub date_column: Option<String>,
    /// Inclusive lower bound on `date_column`
    pub start_date: Option<String>,
    /// Extra equality filter
    pub id_filter: Option<IdFilter>,
}

impl FetchRequest {
    /// Fetch every record of `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Default::default()
        }
    }

    /// Only records with `date_column >= start_date`, ordered by `date_column`.
    pub fn since(mut self, date_column: impl Into<String>, start_date: impl Into<String>) -> Self {
        self.date_column = Some(date_column.into());
        self.start_date = Some(start_date.into());
        self
    }

    /// Add an equality filter.
    pub fn with_id_filter(mut self, filter: Option<IdFilter>) -> Self {
        self.id_filter = filter;
        self
    }

    /// `$filter` expression, if the request is date-bounded.
    pub fn filter(&self) -> Option<String> {
        let (Some(date), Some(start)) = (&self.date_column, &self.start_date) else {
            return None;
        };
        let mut filter = format!("{} ge {}", date, start);
        if let Some(IdFilter { key, value }) = &self.id_filter {
            filter.push_str(&format!(" and {} eq {}", key, value));
        }
        Some(filter)
    }

    /// Query parameters for one page.
    pub fn query(&self, page: u32, page_size: usize) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("$pageNumber", page.to_string()),
            ("$limit", page_size.to_string()),
        ];
        if let Some(filter) = self.filter() {
            params.push(("$filter", filter));
        }
        if let (Some(date), Some(_)) = (&self.date_column, &self.start_date) {
            params.push(("$orderby", date.clone()));
        }
        params
    }
}

/// A paginated source of JSON records.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Fetch every record matching `request`. Either all pages succeed or
    /// the whole fetch fails.
    async fn fetch_records(&self, request: &FetchRequest) -> Result<Vec<JsonValue>>;
}

/// Aspire API client.
pub struct AspireClient {
    http: reqwest::Client,
    config: AspireConfig,
    retry: RetryConfig,
    token: RwLock<Option<BearerToken>>,
    metrics: Arc<Metrics>,
}

impl AspireClient {
    /// Create a client. No request is sent until [`authenticate`](Self::authenticate)
    /// or the first fetch.
    pub fn new(config: AspireConfig, retry: RetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout()?)
            .user_agent(concat!("aspire-duck-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            retry,
            token: RwLock::new(None),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Share a metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Exchange the client credentials for a bearer token and cache it.
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub async fn authenticate(&self) -> Result<BearerToken> {
        let token = self
            .with_retry("token exchange", || self.request_token())
            .await
            .map_err(|e| match e {
                Error::Authentication { .. } => e,
                other => Error::authentication(None, other.to_string()),
            })?;

        *self.token.write().await = Some(token.clone());
        info!("Authenticated with Aspire API");
        Ok(token)
    }

    async fn request_token(&self) -> Result<BearerToken> {
        self.metrics.record_api_request();

        let response = self
            .http
            .post(self.config.auth_endpoint())
            .json(&TokenRequest {
                client_id: &self.config.client_id,
                secret: &self.config.client_secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::authentication(
                Some(status.as_u16()),
                format!("Token request rejected: {}", body),
            ));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            Error::authentication(
                Some(status.as_u16()),
                format!("Failed to parse token response: {}", e),
            )
        })?;

        match parsed.token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(Error::authentication(
                Some(status.as_u16()),
                "Token response has no Token",
            )),
        }
    }

    async fn current_token(&self) -> Result<BearerToken> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    async fn fetch_page(
        &self,
        token: &BearerToken,
        request: &FetchRequest,
        page: u32,
    ) -> Result<Vec<JsonValue>> {
        self.metrics.record_api_request();

        let response = self
            .http
            .get(self.config.feed_endpoint(&request.entity))
            .bearer_auth(token.as_str())
            .query(&request.query(page, self.config.page_size))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::fetch(&request.entity, Some(status.as_u16()), body));
        }

        let text = response.text().await?;
        let body: JsonValue = serde_json::from_str(&text).map_err(|e| {
            Error::serialization(format!("Invalid JSON page from {}", request.entity), e)
        })?;

        match body {
            JsonValue::Array(records) => Ok(records),
            other => Err(Error::fetch(
                &request.entity,
                Some(status.as_u16()),
                format!("Expected a JSON array, got {}", json_kind(&other)),
            )),
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_retries = self.retry.max_retries;
        let metrics = &self.metrics;

        let result = backoff::future::retry(create_backoff(&self.retry), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            let fut = op();
            async move {
                fut.await.map_err(|e| {
                    if e.is_retryable() && attempt < max_retries {
                        warn!("{} failed (attempt {}), retrying: {}", what, attempt + 1, e);
                        metrics.record_retry();
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await;

        let made = attempts.load(Ordering::Relaxed);
        result.map_err(|e| {
            if made > 1 && e.is_retryable() {
                Error::RetryExhausted {
                    attempts: made,
                    message: what.to_string(),
                    last_error: Some(Box::new(e)),
                }
            } else {
                e
            }
        })
    }
}

impl RecordSource for AspireClient {
    #[instrument(skip(self, request), fields(entity = %request.entity))]
    async fn fetch_records(&self, request: &FetchRequest) -> Result<Vec<JsonValue>> {
        let token = self.current_token().await?;
        let what = format!("{} page fetch", request.entity);

        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let batch = self
                .with_retry(&what, || self.fetch_page(&token, request, page))
                .await?;
            if batch.is_empty() {
                break;
            }
            debug!("Fetched page {} of {}: {} records", page, request.entity, batch.len());
            records.extend(batch);
            page += 1;
        }

        info!(
            "Fetched {} records for {} in {} pages",
            records.len(),
            request.entity,
            page - 1
        );
        Ok(records)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression() {
        let request = FetchRequest::new("WorkTickets").since("LastModifiedDateTime", "2021-03-01");
        assert_eq!(
            request.filter().as_deref(),
            Some("LastModifiedDateTime ge 2021-03-01")
        );

        let request = request.with_id_filter(Some(IdFilter {
            key: "BranchID".into(),
            value: "4".into(),
        }));
        assert_eq!(
            request.filter().as_deref(),
            Some("LastModifiedDateTime ge 2021-03-01 and BranchID eq 4")
        );
    }

    #[test]
    fn test_unfiltered_query() {
        let request = FetchRequest::new("Services");
        assert!(request.filter().is_none());
        assert_eq!(
            request.query(3, 1000),
            vec![
                ("$pageNumber", "3".to_string()),
                ("$limit", "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_dated_query_orders_by_date() {
        let request = FetchRequest::new("Properties").since("ModifiedDate", "2015-01-01");
        let query = request.query(1, 500);
        assert!(query.contains(&("$orderby", "ModifiedDate".to_string())));
        assert!(query.contains(&("$filter", "ModifiedDate ge 2015-01-01".to_string())));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = BearerToken::new("secret-value");
        assert_eq!(format!("{:?}", token), "BearerToken(***)");
        assert_eq!(token.as_str(), "secret-value");
    }
}
