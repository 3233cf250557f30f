//! Previous-vintage download over HTTP.
//!
//! The identity resolver needs the previous vintage of the dataset as its
//! matching baseline. This module fetches that archive from a distribution
//! URL with automatic retry: transient failures (connect errors, 5xx, 429)
//! back off exponentially with jitter before the next attempt.
//!
//! Requires the `http` feature.

use crate::Error;
use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fetch the previous-vintage archive, returning its raw bytes.
///
/// Retries transient failures up to 5 times, backing off `1s, 2s, 4s, 8s`
/// plus jitter between attempts. Client errors other than 429 fail
/// immediately.
pub async fn fetch_previous_vintage_async(url: &str) -> Result<Vec<u8>, Error> {
    fetch_with_retry(url, MAX_ATTEMPTS, BASE_DELAY).await
}

/// Retry loop with an injectable schedule. The backoff before attempt `n`
/// is `base_delay * 2^(n-2)` plus up to one `base_delay` of jitter.
async fn fetch_with_retry(
    url: &str,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<Vec<u8>, Error> {
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::Download {
            url: url.to_string(),
            attempts: 0,
            message: format!("failed to create HTTP client: {}", e),
        })?;

    let mut last_error = String::new();
    for attempt in 0..max_attempts {
        if attempt > 0 {
            let backoff = base_delay * (1 << (attempt - 1));
            let jitter_ceiling = (base_delay.as_millis() as u64).max(1);
            let jitter =
                Duration::from_millis(rand::rng().random_range(0..jitter_ceiling));
            debug!(
                "retrying {} (attempt {}/{}) after {:?}",
                url,
                attempt + 1,
                max_attempts,
                backoff + jitter
            );
            tokio::time::sleep(backoff + jitter).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.map_err(|e| Error::Download {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        message: format!("body read failed: {}", e),
                    })?;
                    info!("fetched {} ({} bytes)", url, bytes.len());
                    return Ok(bytes.to_vec());
                }
                if status.is_server_error() || status.as_u16() == 429 {
                    warn!("{} returned {}, will retry", url, status);
                    last_error = format!("status {}", status);
                    continue;
                }
                // Client errors other than 429 will not improve on retry.
                return Err(Error::Download {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    message: format!("status {}", status),
                });
            }
            Err(e) => {
                warn!("{} request failed: {}, will retry", url, e);
                last_error = e.to_string();
            }
        }
    }

    Err(Error::Download {
        url: url.to_string(),
        attempts: max_attempts,
        message: last_error,
    })
}

/// Synchronous wrapper: runs the async fetch on a tokio runtime.
pub fn fetch_previous_vintage(url: &str) -> Result<Vec<u8>, Error> {
    use tokio::runtime::Builder;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Download {
            url: url.to_string(),
            attempts: 0,
            message: format!("failed to create tokio runtime: {}", e),
        })?;

    rt.block_on(fetch_previous_vintage_async(url))
}
