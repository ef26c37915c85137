use std::time::Duration;

use bydsync_common::error::{SyncError, SyncResult};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};

use super::models::{ODataEnvelope, RawRecord};
use super::query::DeltaQuery;

#[derive(Debug, Clone)]
pub struct ByDClientConfig {
    pub base_url: String,
    /// Pre-encoded basic credentials (`base64(user:password)`).
    pub auth: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_pages: u32,
}

impl ByDClientConfig {
    /// Load ByD connection settings from environment.
    ///
    /// `BYD_ODATA` and `BYD_AUTH` are mandatory; tuning knobs fall back to defaults.
    pub fn from_env() -> SyncResult<Self> {
        let base_url = required_var("BYD_ODATA")?;
        let auth = required_var("BYD_AUTH")?;

        let max_pages = parsed_var_or("BYD_MAX_PAGES", 100);
        if max_pages == 0 {
            return Err(SyncError::Config(
                "BYD_MAX_PAGES must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            auth,
            timeout_secs: parsed_var_or("BYD_TIMEOUT_SECS", 30),
            max_retries: parsed_var_or("BYD_MAX_RETRIES", 3),
            max_pages,
        })
    }
}

fn required_var(key: &str) -> SyncResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SyncError::Config(format!("{key} is required but not set")))
}

/// Exponential backoff in seconds, capped at 30.
fn backoff_secs(attempt: u32) -> u64 {
    1u64.checked_shl(attempt).unwrap_or(u64::MAX).min(30)
}

fn parsed_var_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone)]
pub struct ByDClient {
    client: Client,
    config: ByDClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ByDClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("credentials rejected, HTTP {status}: {body}")]
    AuthError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    EnvelopeError(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("result set still paging after {max_pages} pages")]
    TooManyPages { max_pages: u32 },
}

impl ByDClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthError { .. })
    }
}

impl ByDClient {
    pub fn new(config: ByDClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ByDClientConfig {
        &self.config
    }

    /// Run a delta query, following `__next` links until the result set is exhausted.
    pub async fn fetch(&self, query: &DeltaQuery) -> Result<Vec<RawRecord>, ByDClientError> {
        let mut url = self.entity_url(&query.endpoint);
        let mut params = Some(query.query_params());
        let mut records = Vec::new();

        tracing::debug!(entity = %query.entity, %url, filter = %query.filter, "requesting byd objects");

        for page in 0..self.config.max_pages {
            let envelope = self.request_with_retry(&url, params.as_deref()).await?;
            tracing::debug!(
                entity = %query.entity,
                page,
                count = envelope.d.results.len(),
                "received byd page"
            );
            records.extend(envelope.d.results);

            match envelope.d.next {
                Some(next) if !next.is_empty() => {
                    url = self.resolve_next(&next);
                    // The next link already carries the original query options.
                    params = None;
                }
                _ => return Ok(records),
            }
        }

        Err(ByDClientError::TooManyPages {
            max_pages: self.config.max_pages,
        })
    }

    fn entity_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn resolve_next(&self, next: &str) -> String {
        if next.starts_with("http://") || next.starts_with("https://") {
            next.to_string()
        } else {
            self.entity_url(next)
        }
    }

    async fn request_with_retry(
        &self,
        url: &str,
        params: Option<&[(&'static str, String)]>,
    ) -> Result<ODataEnvelope, ByDClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = backoff_secs(attempt);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let mut request = self
                .client
                .get(url)
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .header(AUTHORIZATION, format!("Basic {}", self.config.auth))
                // Token from the response is not captured or replayed yet.
                .header("x-csrf-token", "fetch");
            if let Some(params) = params {
                request = request.query(params);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(ByDClientError::RequestError(e));
                }
            };

            let status = response.status();
            tracing::info!(status = status.as_u16(), "byd response");

            if status.is_success() {
                let body = response.bytes().await?;
                return serde_json::from_slice::<ODataEnvelope>(&body)
                    .map_err(|e| ByDClientError::EnvelopeError(e.to_string()));
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = response.text().await.unwrap_or_default();
                return Err(ByDClientError::AuthError { status, body });
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ByDClientError::HttpError { status, body });
        }

        Err(ByDClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries.saturating_add(1),
            last_error,
        })
    }
}
