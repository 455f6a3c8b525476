//! PDS job status waits.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::SecHubError;
use crate::client::SecHubClient;
use crate::poll::{self, Decision, Evaluator, Failure, PollError, PollSettings};

/// State of a job on the PDS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdsJobState {
    Created,
    ReadyToStart,
    Queued,
    Running,
    CancelRequested,
    Canceled,
    Done,
    Failed,
}

impl PdsJobState {
    pub const ALL: [PdsJobState; 8] = [
        PdsJobState::Created,
        PdsJobState::ReadyToStart,
        PdsJobState::Queued,
        PdsJobState::Running,
        PdsJobState::CancelRequested,
        PdsJobState::Canceled,
        PdsJobState::Done,
        PdsJobState::Failed,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PdsJobState::Created => "CREATED",
            PdsJobState::ReadyToStart => "READY_TO_START",
            PdsJobState::Queued => "QUEUED",
            PdsJobState::Running => "RUNNING",
            PdsJobState::CancelRequested => "CANCEL_REQUESTED",
            PdsJobState::Canceled => "CANCELED",
            PdsJobState::Done => "DONE",
            PdsJobState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PdsJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PdsJobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown PDS job state '{s}', expected one of: {}",
                    Self::ALL.map(|state| state.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdsJobStatus {
    #[serde(rename = "jobUUID", alias = "jobUuid")]
    pub job_uuid: Uuid,
    pub state: PdsJobState,
}

/// Waits for one PDS state. A `FAILED` job stops the wait at once unless
/// `FAILED` is the wanted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdsStateExpectation {
    wanted: PdsJobState,
}

impl PdsStateExpectation {
    #[must_use]
    pub fn new(wanted: PdsJobState) -> Self {
        Self { wanted }
    }
}

impl Evaluator<PdsJobStatus> for PdsStateExpectation {
    fn evaluate(&self, status: &PdsJobStatus) -> Decision {
        if status.state == self.wanted {
            Decision::Succeed
        } else if status.state == PdsJobState::Failed {
            Decision::Fail(Failure::Terminal(format!(
                "PDS job {} has failed, expected state {}",
                status.job_uuid, self.wanted
            )))
        } else {
            Decision::Continue
        }
    }

    fn describe(&self, status: Option<&PdsJobStatus>) -> String {
        let found = status.map_or_else(|| "no status fetched".to_string(), |s| s.state.to_string());
        format!("Expected: {}\nFound: {found}\n", self.wanted)
    }
}

/// PDS job operations of a [`SecHubClient`]. Requires a configured PDS URL.
#[derive(Debug, Clone, Copy)]
pub struct PdsApi<'a> {
    client: &'a SecHubClient,
}

impl<'a> PdsApi<'a> {
    pub(crate) fn new(client: &'a SecHubClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Missing PDS URL, transport errors, non-success answers and
    /// undecodable payloads.
    pub async fn fetch_job_status(&self, job_uuid: &Uuid) -> Result<PdsJobStatus, SecHubError> {
        let url = self
            .client
            .pds_endpoint(&format!("/api/job/{job_uuid}/status"))?;
        self.client.get_json(&url).await
    }

    /// Text written by the PDS job to its standard output.
    ///
    /// # Errors
    ///
    /// Missing PDS URL, transport errors and non-success answers.
    pub async fn fetch_output_stream(&self, job_uuid: &Uuid) -> Result<String, SecHubError> {
        let url = self.client.pds_endpoint(&format!(
            "/api/admin/monitoring/job/{job_uuid}/stream/output"
        ))?;
        self.client.get_text(&url).await
    }

    /// Text written by the PDS job to its error output.
    ///
    /// # Errors
    ///
    /// Missing PDS URL, transport errors and non-success answers.
    pub async fn fetch_error_stream(&self, job_uuid: &Uuid) -> Result<String, SecHubError> {
        let url = self.client.pds_endpoint(&format!(
            "/api/admin/monitoring/job/{job_uuid}/stream/error"
        ))?;
        self.client.get_text(&url).await
    }

    /// Poll until the PDS job is in `wanted` state.
    ///
    /// When the wait fails because the job failed or the timeout was reached,
    /// the job's output and error streams are appended to the report.
    ///
    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_pds_job_in_state(
        &self,
        job_uuid: &Uuid,
        wanted: PdsJobState,
        settings: PollSettings,
    ) -> Result<PdsJobStatus, PollError> {
        info!("wait for PDS job {job_uuid} in state {wanted}");
        let api = *self;
        let mut fetcher =
            poll::from_fn(move || async move { api.fetch_job_status(job_uuid).await });

        match poll::poll_until(&mut fetcher, &PdsStateExpectation::new(wanted), settings).await {
            Ok(polled) => Ok(polled.snapshot),
            Err(error @ (PollError::TerminalFailure { .. } | PollError::Timeout { .. })) => {
                let streams = self.describe_streams(job_uuid).await;
                Err(error.with_appended_report(&streams))
            }
            Err(error) => Err(error),
        }
    }

    /// Best effort dump of both streams; fetch problems end up in the text.
    async fn describe_streams(&self, job_uuid: &Uuid) -> String {
        let output = self
            .fetch_output_stream(job_uuid)
            .await
            .unwrap_or_else(|e| {
                warn!("could not fetch output stream of PDS job {job_uuid}: {e}");
                format!("<output stream not available: {e}>")
            });
        let error = self
            .fetch_error_stream(job_uuid)
            .await
            .unwrap_or_else(|e| {
                warn!("could not fetch error stream of PDS job {job_uuid}: {e}");
                format!("<error stream not available: {e}>")
            });

        format_streams(job_uuid, &output, &error)
    }
}

fn format_streams(job_uuid: &Uuid, output: &str, error: &str) -> String {
    format!(
        "\nPDS job: {job_uuid}\n\nOutput stream:\n----------------------\n{output}\n\n\
         Error stream:\n----------------------\n{error}\n"
    )
}
