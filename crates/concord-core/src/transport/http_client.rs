use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::RelayError;

/// HTTP client concurrency and retry settings.
///
/// Loaded from the `[http]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Maximum number of concurrent relay requests
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,
    /// How long a call may wait for a free request slot, in milliseconds
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,
    /// Retries after a 5xx response or a failed connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_concurrent_limit() -> usize {
    100
}

fn default_permit_timeout_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    2
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
            max_retries: default_max_retries(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// HTTP client with semaphore-based concurrency control.
///
/// Shared by every call of an [`super::HttpTransport`]; cloning the transport shares the pool.
pub struct HttpClient {
    client: Client,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
}

/// RAII guard ensuring semaphore permits are always released, including when the request
/// future is dropped mid-flight.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpClient {
    /// Creates a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new() -> Result<Self, RelayError> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Maps a reqwest error to a message that doesn't echo URLs or credentials.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Creates a client with the provided settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, RelayError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("concord/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                RelayError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit.max(1))),
            config,
        })
    }

    /// POSTs a JSON body, retrying 5xx responses and connection failures with backoff.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Timeout`] if no request slot frees up in time or the request times out
    /// - [`RelayError::HttpError`] for non-success HTTP status codes
    /// - [`RelayError::ConnectionFailed`] for network failures after retries
    pub async fn post_json(
        &self,
        url: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, RelayError> {
        let permit_timeout = Duration::from_millis(self.config.permit_timeout_ms);
        let permit = tokio::time::timeout(
            permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available_permits = self.concurrent_limit.available_permits(),
                "http client semaphore acquisition timeout"
            );
            RelayError::Timeout {
                timeout_ms: self.config.permit_timeout_ms,
                reason: "waiting for a free relay connection".to_string(),
            }
        })?
        .map_err(|_| RelayError::ConnectionFailed("http client closed".to_string()))?;

        let _permit_guard = PermitGuard::new(permit, Arc::clone(&self.concurrent_limit));

        let mut retries = 0;

        loop {
            let result = self
                .client
                .post(url)
                .header("content-type", "application/json")
                // Bytes::clone is a refcount bump, retries don't copy the body
                .body(body.clone())
                .timeout(timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    if response.status().is_success() {
                        return response.bytes().await.map_err(RelayError::Network);
                    } else if response.status().is_server_error() && retries < self.config.max_retries
                    {
                        retries += 1;
                        tracing::debug!(
                            status = response.status().as_u16(),
                            retry = retries,
                            "relay returned server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(100 * (1 << retries))).await;
                        continue;
                    }

                    let status = response.status().as_u16();
                    let raw_text = response.text().await.unwrap_or_default();
                    let sanitized_text = if raw_text.len() > 256 {
                        let cut = (0..=256).rev().find(|i| raw_text.is_char_boundary(*i)).unwrap_or(0);
                        format!("{}... (truncated)", &raw_text[..cut])
                    } else {
                        raw_text
                    };
                    return Err(RelayError::HttpError(status, sanitized_text));
                }
                Err(e) if e.is_connect() && retries < self.config.max_retries => {
                    retries += 1;
                    tokio::time::sleep(Duration::from_millis(100 * (1 << retries))).await;
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(RelayError::Timeout {
                            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            reason: "relay did not answer".to_string(),
                        });
                    }
                    return Err(RelayError::ConnectionFailed(Self::sanitize_network_error(&e)));
                }
            }
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}
