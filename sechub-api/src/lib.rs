//! # SecHub Test Kit
//!
//! A Rust toolkit for synchronising integration tests with a running SecHub
//! server and its Product Delegation Server (PDS).
//!
//! Both servers process work asynchronously: a scan job submitted over REST is
//! scheduled, started and finished by background workers, domain events are
//! delivered to several consumers in no guaranteed order, and auto-cleanup
//! deletes data on its own timer. A test therefore cannot assert on remote
//! state directly. It has to wait until that state settles.
//!
//! This library provides one generic protocol for that, the eventual-state
//! poller, and three specialisations of it:
//!
//! - **Job status waits** - poll a SecHub or PDS job until it reaches one of a
//!   set of states, optionally failing fast when the job reports `FAILED`
//! - **Event inspection** - wait until the server's event trace recorder holds
//!   the expected number of senders and receivers, then compare the recorded
//!   trace structurally (unordered, count exact) against an expectation
//! - **Auto-cleanup delete counts** - wait until delete counters match, or
//!   prove that no delete ever happened by waiting out the whole timeout
//!
//! ## Quick Start
//!
//! ```no_run
//! use sechub_testkit::{SecHubClient, SecHubConfig, EventExpectation};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SecHubConfig::new(
//!         "https://localhost:8443".to_string(),
//!         "int-test_superadmin".to_string(),
//!         "int-test_superadmin-pwd".to_string(),
//!     )
//!     .with_certificate_validation_disabled();
//!
//!     let client = SecHubClient::new(config)?;
//!
//!     let job_uuid = uuid::Uuid::new_v4();
//!     client.job_api().wait_for_job_done("project1", &job_uuid, 5, true).await?;
//!
//!     let expectation = EventExpectation::builder()
//!         .async_event("USER_ADDED_TO_PROJECT")
//!         .from("ProjectAssignUserService")
//!         .to(&["ScheduleMessageHandler", "ScanMessageHandler"])
//!         .build();
//!     client
//!         .event_inspection_api()
//!         .assert_events(&expectation, Duration::from_secs(3))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod client;
pub mod compare;
pub mod diagnostics;
pub mod events;
pub mod job;
pub mod pds;
pub mod poll;

#[cfg(test)]
pub(crate) mod test_utils;

use secrecy::SecretString;
use std::sync::Arc;

// Re-export common types for convenience
pub use cleanup::{AutoCleanupApi, DeleteCount, DeleteCountExpectation};
pub use client::SecHubClient;
pub use compare::{ComparisonResult, ReceiverDifference, compare_inspections};
pub use events::{
    EventEntryBuilder, EventExpectation, EventExpectationBuilder, EventHistory, EventInspectionApi, ExpectedEvent,
    Inspection, InspectionStatus,
};
pub use job::{ExecutionResult, ExecutionState, JobApi, JobStatus, JobStatusExpectation};
pub use pds::{PdsApi, PdsJobState, PdsJobStatus, PdsStateExpectation};
pub use poll::{
    Decision, Evaluator, Failure, PollContext, PollError, PollSettings, Polled, SnapshotFetcher,
    poll_until,
};

/// Error type for all SecHub/PDS REST interactions.
#[derive(Debug, thiserror::Error)]
pub enum SecHubError {
    /// HTTP transport failed (connect, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Server answered with a non-success status
    #[error("Invalid response: HTTP {status}: {message}")]
    InvalidResponse { status: u16, message: String },
    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A fetch did not answer within the remaining wait budget
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// Transport retries were used up
    #[error("Retry exhausted: {0}")]
    RetryExhausted(String),
    /// Local file I/O failed (history export)
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecHubError {
    /// Whether a poll loop may swallow this error and try again on the next
    /// attempt.
    ///
    /// Transport problems, server errors and "not there yet" answers are
    /// transient. Bad requests, wrong credentials, missing permissions,
    /// undecodable payloads and local problems are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SecHubError::Http(e) => !e.is_builder() && !e.is_decode(),
            SecHubError::InvalidResponse { status, .. } => !matches!(status, 400 | 401 | 403),
            SecHubError::Timeout(_) | SecHubError::RetryExhausted(_) => true,
            SecHubError::Serialization(_) | SecHubError::InvalidConfig(_) | SecHubError::Io(_) => {
                false
            }
        }
    }
}

/// Transport level retry settings used by [`SecHubClient`] for every single
/// request. This is independent of the poll loop, which repeats whole
/// snapshot fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Disable transport retries completely.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1 based), capped at `max_delay_ms`.
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        std::time::Duration::from_millis(capped as u64)
    }
}

/// Configuration for the SecHub test kit client.
///
/// Holds the SecHub server location, the optional PDS location and the
/// credentials used for HTTP basic authentication against both.
#[derive(Debug, Clone)]
pub struct SecHubConfig {
    /// SecHub server base URL, e.g. `https://localhost:8443`
    pub server_url: String,
    /// PDS base URL, required for PDS operations only
    pub pds_url: Option<String>,
    /// User id used for basic authentication
    pub user_id: String,
    /// API token used for basic authentication (never printed)
    pub api_token: Arc<SecretString>,
    /// Whether to validate TLS certificates (default: true)
    pub validate_certificates: bool,
    /// Connect timeout in seconds
    pub connect_timeout: u64,
    /// Request timeout in seconds
    pub request_timeout: u64,
    pub retry_config: RetryConfig,
}

impl SecHubConfig {
    /// Create a configuration for the given server and credentials.
    pub fn new(server_url: String, user_id: String, api_token: String) -> Self {
        Self {
            server_url: trim_trailing_slash(server_url),
            pds_url: None,
            user_id,
            api_token: Arc::new(SecretString::new(api_token.into())),
            validate_certificates: true,
            connect_timeout: 10,
            request_timeout: 30,
            retry_config: RetryConfig::default(),
        }
    }

    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidConfig` when a required variable is
    /// missing or a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, SecHubError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    ///
    /// Required: `SECHUB_SERVER`, `SECHUB_USERID`, `SECHUB_APITOKEN`.
    /// Optional: `SECHUB_PDS_SERVER`, `SECHUB_DISABLE_CERT_VALIDATION`,
    /// `SECHUB_CONNECT_TIMEOUT`, `SECHUB_REQUEST_TIMEOUT`,
    /// `SECHUB_MAX_RETRIES`, `SECHUB_INITIAL_RETRY_DELAY_MS`.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::InvalidConfig` when a required key is missing or
    /// a numeric key cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SecHubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| {
                    SecHubError::InvalidConfig(format!("missing environment variable {key}"))
                })
        };

        let mut config = Self::new(
            required("SECHUB_SERVER")?,
            required("SECHUB_USERID")?,
            required("SECHUB_APITOKEN")?,
        );

        if let Some(pds_url) = lookup("SECHUB_PDS_SERVER").filter(|v| !v.trim().is_empty()) {
            config = config.with_pds_url(pds_url);
        }

        if lookup("SECHUB_DISABLE_CERT_VALIDATION")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
        {
            config = config.with_certificate_validation_disabled();
        }

        if let Some(value) = lookup("SECHUB_CONNECT_TIMEOUT") {
            config.connect_timeout = parse_number("SECHUB_CONNECT_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("SECHUB_REQUEST_TIMEOUT") {
            config.request_timeout = parse_number("SECHUB_REQUEST_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("SECHUB_MAX_RETRIES") {
            config.retry_config.max_attempts = parse_number("SECHUB_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("SECHUB_INITIAL_RETRY_DELAY_MS") {
            config.retry_config.initial_delay_ms =
                parse_number("SECHUB_INITIAL_RETRY_DELAY_MS", &value)?;
        }

        Ok(config)
    }

    /// Set the PDS base URL.
    pub fn with_pds_url(mut self, pds_url: String) -> Self {
        self.pds_url = Some(trim_trailing_slash(pds_url));
        self
    }

    /// Disable certificate validation for local test servers with self-signed
    /// certificates.
    ///
    /// WARNING: Never use this against production servers.
    pub fn with_certificate_validation_disabled(mut self) -> Self {
        self.validate_certificates = false;
        self
    }

    /// Set connect and request timeouts (seconds).
    pub fn with_timeouts(mut self, connect_timeout: u64, request_timeout: u64) -> Self {
        self.connect_timeout = connect_timeout;
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SecHubError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| SecHubError::InvalidConfig(format!("{key} is not a valid number: {value}")))
}
