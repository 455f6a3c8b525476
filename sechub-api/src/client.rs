//! Core SecHub REST client.
//!
//! Authenticated (HTTP basic) access to the SecHub server and its PDS, with
//! transport level retries. Higher level wait APIs are reached through the
//! accessor methods (`job_api`, `pds_api`, `event_inspection_api`, ...).

use log::{debug, info, warn};
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use url::Url;

use crate::cleanup::AutoCleanupApi;
use crate::events::EventInspectionApi;
use crate::job::JobApi;
use crate::pds::PdsApi;
use crate::{SecHubConfig, SecHubError};

/// Core SecHub API client.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct SecHubClient {
    config: SecHubConfig,
    client: Client,
    server_base: Url,
    pds_base: Option<Url>,
}

impl std::fmt::Debug for SecHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecHubClient")
            .field("server_url", &self.config.server_url)
            .field("pds_url", &self.config.pds_url)
            .field("user_id", &self.config.user_id)
            .finish_non_exhaustive()
    }
}

impl SecHubClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidConfig` for a server or PDS URL that is
    /// not an absolute http(s) URL or an empty user id, `SecHubError::Http`
    /// when the HTTP client cannot be built.
    pub fn new(config: SecHubConfig) -> Result<Self, SecHubError> {
        let server_base = parse_base_url("server URL", &config.server_url)?;
        let pds_base = config
            .pds_url
            .as_deref()
            .map(|pds_url| parse_base_url("PDS URL", pds_url))
            .transpose()?;
        if config.user_id.is_empty() {
            return Err(SecHubError::InvalidConfig(
                "user id must not be empty".to_string(),
            ));
        }

        let mut client_builder = Client::builder();

        // Local test servers run with self-signed certificates
        if !config.validate_certificates {
            client_builder = client_builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        client_builder = client_builder
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout));

        let client = client_builder.build().map_err(SecHubError::Http)?;
        Ok(Self {
            config,
            client,
            server_base,
            pds_base,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SecHubConfig {
        &self.config
    }

    /// SecHub server base URL.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// PDS base URL.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidConfig` when no PDS URL is configured.
    pub fn pds_url(&self) -> Result<&str, SecHubError> {
        self.config.pds_url.as_deref().ok_or_else(|| {
            SecHubError::InvalidConfig("no PDS server URL configured".to_string())
        })
    }

    /// Full URL of a SecHub server endpoint.
    #[must_use]
    pub fn sechub_endpoint(&self, path: &str) -> String {
        join_url(&self.server_base, path)
    }

    /// Full URL of a PDS endpoint.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidConfig` when no PDS URL is configured.
    pub fn pds_endpoint(&self, path: &str) -> Result<String, SecHubError> {
        let base = self.pds_base.as_ref().ok_or_else(|| {
            SecHubError::InvalidConfig("no PDS server URL configured".to_string())
        })?;
        Ok(join_url(base, path))
    }

    #[must_use]
    pub fn job_api(&self) -> JobApi<'_> {
        JobApi::new(self)
    }

    #[must_use]
    pub fn pds_api(&self) -> PdsApi<'_> {
        PdsApi::new(self)
    }

    #[must_use]
    pub fn event_inspection_api(&self) -> EventInspectionApi<'_> {
        EventInspectionApi::new(self)
    }

    /// Auto-cleanup inspection of the SecHub server.
    #[must_use]
    pub fn auto_cleanup_api(&self) -> AutoCleanupApi<'_> {
        AutoCleanupApi::for_sechub(self)
    }

    /// Auto-cleanup inspection of the PDS.
    #[must_use]
    pub fn pds_auto_cleanup_api(&self) -> AutoCleanupApi<'_> {
        AutoCleanupApi::for_pds(self)
    }

    /// Execute an HTTP request with retry logic and exponential backoff.
    ///
    /// Transport failures and 5xx/429 answers are retried up to
    /// `retry_config.max_attempts` times. Any other answer is returned to
    /// the caller unchanged.
    async fn execute_with_retry<F>(
        &self,
        request_builder: F,
        operation_name: Cow<'_, str>,
    ) -> Result<reqwest::Response, SecHubError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let retry_config = &self.config.retry_config;
        let start_time = Instant::now();

        if retry_config.max_attempts == 0 {
            return request_builder().send().await.map_err(SecHubError::Http);
        }

        let mut last_error = None;

        for attempt in 1..=retry_config.max_attempts.saturating_add(1) {
            let error = match request_builder().send().await {
                Ok(response) if is_retryable_status(response.status()) => {
                    let status = response.status().as_u16();
                    let message = response.text().await.unwrap_or_default();
                    SecHubError::InvalidResponse { status, message }
                }
                Ok(response) => {
                    if attempt > 1 {
                        info!("{operation_name} succeeded on attempt {attempt}");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_builder() => return Err(SecHubError::Http(e)),
                Err(e) => SecHubError::Http(e),
            };

            if attempt > retry_config.max_attempts {
                last_error = Some(error);
                break;
            }

            let delay = retry_config.calculate_delay(attempt);
            warn!(
                "{operation_name} failed on attempt {attempt}, retrying in {}ms: {error}",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }

        let elapsed = start_time.elapsed();
        match last_error {
            // Keep the server's answer so callers can classify it
            Some(error @ SecHubError::InvalidResponse { .. }) => Err(error),
            Some(error) => Err(SecHubError::RetryExhausted(format!(
                "{} failed after {} attempts over {}ms: {}",
                operation_name,
                retry_config.max_attempts.saturating_add(1),
                elapsed.as_millis(),
                error
            ))),
            None => Err(SecHubError::RetryExhausted(format!(
                "{operation_name} failed with unknown error"
            ))),
        }
    }

    /// Send one authenticated request (with retries).
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
    ) -> Result<reqwest::Response, SecHubError> {
        let request_builder = || {
            let mut request = self
                .client
                .request(method.clone(), url)
                .basic_auth(
                    &self.config.user_id,
                    Some(self.config.api_token.expose_secret()),
                )
                .header("Accept", "application/json");

            if let Some(ref body) = body {
                request = request
                    .header("Content-Type", "application/json")
                    .body(body.clone());
            }
            request
        };

        let operation_name = Cow::Owned(format!("{method} {url}"));
        debug!("{operation_name}");
        self.execute_with_retry(request_builder, operation_name)
            .await
    }

    /// Check the status of a response and turn non-success answers into
    /// `SecHubError::InvalidResponse`.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidResponse` for non-2xx answers.
    pub async fn handle_response(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, SecHubError> {
        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().clone();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SecHubError::InvalidResponse {
                status: status.as_u16(),
                message: format!("Failed to {context}\n  URL: {url}\n  Body: {error_text}"),
            });
        }
        Ok(response)
    }

    /// GET a URL and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success answers and undecodable bodies.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SecHubError> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// GET a URL and return the raw body.
    ///
    /// # Errors
    ///
    /// Transport errors and non-success answers.
    pub async fn get_text(&self, url: &str) -> Result<String, SecHubError> {
        let response = self.send(Method::GET, url, None).await?;
        let response = Self::handle_response(response, &format!("GET {url}")).await?;
        Ok(response.text().await?)
    }

    /// POST an optional JSON body and return the raw answer body.
    ///
    /// # Errors
    ///
    /// Serialization errors, transport errors and non-success answers.
    pub async fn post<T: Serialize>(
        &self,
        url: &str,
        body: Option<&T>,
    ) -> Result<String, SecHubError> {
        let serialized_body = body.map(serde_json::to_string).transpose()?;
        let response = self.send(Method::POST, url, serialized_body).await?;
        let response = Self::handle_response(response, &format!("POST {url}")).await?;
        Ok(response.text().await?)
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Parse a configured base URL. Only absolute http(s) URLs with a host are
/// accepted, so `localhost:8443` (missing scheme) fails here and not at the
/// first request.
fn parse_base_url(name: &str, value: &str) -> Result<Url, SecHubError> {
    let url = Url::parse(value.trim())
        .map_err(|e| SecHubError::InvalidConfig(format!("{name} '{value}' is invalid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(SecHubError::InvalidConfig(format!(
            "{name} '{value}' must be an absolute http(s) URL, e.g. https://localhost:8443"
        )));
    }
    Ok(url)
}

/// Append `path` to the path of `base`, keeping a base path prefix.
fn join_url(base: &Url, path: &str) -> String {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.to_string()
}

/// Percent-encode a single path segment (project ids, class names, ...).
pub(crate) fn encode_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecHubConfig {
        SecHubConfig::new(
            "https://localhost:8443".to_string(),
            "admin".to_string(),
            "secret-token".to_string(),
        )
    }

    #[test]
    fn test_client_creation() {
        let client = SecHubClient::new(config()).unwrap();
        assert_eq!(client.server_url(), "https://localhost:8443");
    }

    #[test]
    fn test_client_rejects_empty_user() {
        let config = SecHubConfig::new(
            "https://localhost:8443".to_string(),
            String::new(),
            "token".to_string(),
        );
        assert!(matches!(
            SecHubClient::new(config),
            Err(SecHubError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let client = SecHubClient::new(config()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("localhost:8443"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_endpoint_urls() {
        let client =
            SecHubClient::new(config().with_pds_url("https://localhost:8444/".to_string()))
                .unwrap();

        assert_eq!(
            client.sechub_endpoint("/api/anonymous/check/alive"),
            "https://localhost:8443/api/anonymous/check/alive"
        );
        assert_eq!(
            client.pds_endpoint("api/job/1/status").unwrap(),
            "https://localhost:8444/api/job/1/status"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encoding() {
        let client = SecHubClient::new(SecHubConfig::new(
            "https://sechub.example.org/sechub/".to_string(),
            "admin".to_string(),
            "secret-token".to_string(),
        ))
        .unwrap();

        assert_eq!(
            client.sechub_endpoint("/api/project/my%20project/job/1"),
            "https://sechub.example.org/sechub/api/project/my%20project/job/1"
        );
    }

    #[test]
    fn test_client_rejects_invalid_urls() {
        for server in ["localhost:8443", "", "not a url", "ftp://localhost:8443"] {
            let config = SecHubConfig::new(
                server.to_string(),
                "admin".to_string(),
                "secret-token".to_string(),
            );
            assert!(
                matches!(SecHubClient::new(config), Err(SecHubError::InvalidConfig(_))),
                "accepted server URL {server:?}"
            );
        }

        let bad_pds = config().with_pds_url("localhost:8444".to_string());
        match SecHubClient::new(bad_pds) {
            Err(SecHubError::InvalidConfig(message)) => assert!(message.contains("PDS URL")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_pds_endpoint_requires_pds_url() {
        let client = SecHubClient::new(config()).unwrap();
        assert!(matches!(
            client.pds_endpoint("/api/job/1/status"),
            Err(SecHubError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("my project"), "my%20project");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(reqwest::StatusCode::OK));
    }
}
