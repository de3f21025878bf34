use crate::error::{InstallError, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Per-request settings for [`fetch_json`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

/// How long to wait before retrying a 429 response.
///
/// `Retry-After` may carry delta seconds or an HTTP date; without it the
/// delay is `2^attempt` seconds.
pub fn retry_delay(headers: &HeaderMap, attempt: u32) -> Duration {
    let header = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    if let Some(value) = header {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs);
        }
        if let Ok(date) = DateTime::parse_from_rfc2822(value) {
            let wait = date.with_timezone(&Utc) - Utc::now();
            return wait.to_std().unwrap_or(Duration::ZERO);
        }
        log::debug!("Ignoring unparseable Retry-After value: {}", value);
    }

    Duration::from_secs(2u64.saturating_pow(attempt.min(16)))
}

/// GET `url` and decode the JSON body.
///
/// Only HTTP 429 is retried, at most `max_retries` times after the first
/// request. Any other failure status or a non-JSON content type is final.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    options: &FetchOptions,
    max_retries: u32,
) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        let mut request = client.get(url).headers(options.headers.clone());
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            if attempt >= max_retries {
                log::error!("Rate limit on {} persisted after {} attempts", url, attempt + 1);
                return Err(InstallError::RateLimitExhausted {
                    url: url.to_string(),
                    attempts: attempt + 1,
                });
            }
            let delay = retry_delay(response.headers(), attempt);
            log::warn!(
                "Rate limited by {} (attempt {}/{}), retrying in {:?}",
                url,
                attempt + 1,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        if !status.is_success() {
            return Err(InstallError::Network {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("HTTP error {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("json") {
            return Err(InstallError::Network {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("expected a JSON response, got '{}'", content_type),
            });
        }

        let bytes = response.bytes().await?;
        log::debug!("Fetched {} ({} bytes)", url, bytes.len());
        return serde_json::from_slice(&bytes).map_err(|e| InstallError::json(url, e));
    }
}
