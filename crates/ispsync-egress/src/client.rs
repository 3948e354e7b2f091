//! Shared HTTP client utilities

use crate::{EgressError, Result};
use reqwest::{Client, ClientBuilder, Method, Url, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Maximum number of retries for transient errors on read-only requests.
    /// Mutating requests (purchases) are never retried.
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
            max_retries: 2,
            user_agent: format!("ispsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Providers drop idle keep-alive sockets after about a minute
        .pool_idle_timeout(Duration::from_secs(55))
        .user_agent(&config.user_agent)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| EgressError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Retry policy for transient errors
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff_ms = 2u64.pow(attempt - 1) * 100; // 100ms, 200ms, 400ms
            debug!(
                "Retrying request after {}ms (attempt {}/{})",
                backoff_ms, attempt, max_retries
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let should_retry = match &e {
                    EgressError::Connection(_) | EgressError::Timeout(_) => true,
                    EgressError::HttpStatus { status_code, .. } => {
                        matches!(status_code, 429 | 502 | 503 | 504)
                    }
                    _ => false,
                };

                if should_retry && attempt < max_retries {
                    warn!(
                        "Request failed (attempt {}/{}): {}",
                        attempt + 1,
                        max_retries,
                        e
                    );
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| EgressError::Config("Retry loop exited unexpectedly".to_string())))
}

/// Base client for one provider endpoint.
///
/// Every adapter owns one of these; it knows how to build URLs, attach
/// credentials and map transport failures onto [`EgressError`].
#[derive(Debug, Clone)]
pub struct ProviderClient {
    endpoint: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    config: HttpClientConfig,
    http: Client,
}

impl ProviderClient {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    /// - `EgressError::Config` if the endpoint is not an absolute URL or the
    ///   HTTP client cannot be built
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
        config: HttpClientConfig,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)
            .map_err(|e| EgressError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        let http = create_client(&config)?;
        Ok(Self {
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
            api_secret: api_secret.filter(|s| !s.is_empty()),
            config,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Shared secret for providers that sign requests
    pub fn api_secret(&self) -> Option<&str> {
        self.api_secret.as_deref()
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Join the endpoint and a relative path with exactly one slash
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send one request and parse the JSON response body.
    ///
    /// # Errors
    /// - `EgressError::Timeout` when the connect or request timeout expires
    /// - `EgressError::Connection` when the endpoint cannot be reached
    /// - `EgressError::HttpStatus` for non-2xx responses
    /// - `EgressError::Protocol` when the body is not JSON
    #[instrument(skip(self, body), fields(endpoint = %self.endpoint))]
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url_for(path);

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.classify(&url, e))?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "provider responded");

        if !status.is_success() {
            let status_code = status.as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            error!("HTTP error {} for {}", status_code, url);
            return Err(EgressError::HttpStatus {
                status_code,
                message,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                EgressError::Timeout(self.config.timeout_secs)
            } else {
                EgressError::Protocol(format!("Failed to parse response from {}: {}", url, e))
            }
        })
    }

    /// Like [`request`](Self::request) but retries transient failures.
    /// Only for requests that do not change remote state.
    pub async fn request_idempotent(&self, method: Method, path: &str) -> Result<Value> {
        with_retry(self.config.max_retries, || self.request(method.clone(), path, None)).await
    }

    /// Probe the endpoint. Never fails: any error is logged and reported as
    /// `false`.
    pub async fn test_connection(&self) -> bool {
        match self.request(Method::GET, "", None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "provider connection test failed");
                false
            }
        }
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> EgressError {
        if err.is_timeout() {
            error!("API timeout for {}", url);
            EgressError::Timeout(self.config.timeout_secs)
        } else if err.is_connect() || err.is_request() {
            error!("Connection error for {}", url);
            EgressError::Connection(err.to_string())
        } else if err.is_builder() {
            EgressError::Config(format!("Invalid request for {}: {}", url, err))
        } else {
            EgressError::Protocol(err.to_string())
        }
    }
}
