//! SecHub job status waits.
//!
//! Jobs move through `INITIALIZING -> READY_TO_START -> STARTED -> ENDED`
//! (or into `CANCEL_REQUESTED`, `CANCELED`, `SUSPENDED`) on the server's
//! scheduler. The result stays `NONE` until the job has run and then becomes
//! `OK` or `FAILED`.

use log::info;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::SecHubError;
use crate::client::{SecHubClient, encode_segment};
use crate::poll::{self, Decision, Evaluator, Failure, PollError, PollSettings, Polled};

/// Scheduler state of a SecHub job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Initializing,
    ReadyToStart,
    Started,
    CancelRequested,
    Canceled,
    Suspended,
    Ended,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 7] = [
        ExecutionState::Initializing,
        ExecutionState::ReadyToStart,
        ExecutionState::Started,
        ExecutionState::CancelRequested,
        ExecutionState::Canceled,
        ExecutionState::Suspended,
        ExecutionState::Ended,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Initializing => "INITIALIZING",
            ExecutionState::ReadyToStart => "READY_TO_START",
            ExecutionState::Started => "STARTED",
            ExecutionState::CancelRequested => "CANCEL_REQUESTED",
            ExecutionState::Canceled => "CANCELED",
            ExecutionState::Suspended => "SUSPENDED",
            ExecutionState::Ended => "ENDED",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown job state '{s}', expected one of: {}",
                    Self::ALL.map(|state| state.as_str()).join(", ")
                )
            })
    }
}

/// Outcome of a SecHub job; `None` until the job has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionResult {
    #[default]
    None,
    Ok,
    Failed,
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionResult::None => "NONE",
            ExecutionResult::Ok => "OK",
            ExecutionResult::Failed => "FAILED",
        })
    }
}

/// Job status snapshot as returned by the server. Fields the poller does not
/// need (owner, timestamps, traffic light, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(rename = "jobUUID", alias = "jobId", alias = "jobUuid")]
    pub job_uuid: Uuid,
    #[serde(alias = "executionState")]
    pub state: ExecutionState,
    #[serde(
        alias = "executionResult",
        default,
        deserialize_with = "deserialize_result"
    )]
    pub result: ExecutionResult,
}

// The server sends `null` as long as there is no result
fn deserialize_result<'de, D>(deserializer: D) -> Result<ExecutionResult, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ExecutionResult>::deserialize(deserializer)?.unwrap_or_default())
}

/// What a job status wait is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusExpectation {
    /// Accepted states, empty accepts every state
    states: Vec<ExecutionState>,
    required_result: Option<ExecutionResult>,
    fail_fast: bool,
}

impl JobStatusExpectation {
    /// Job has ended with result `OK`. A `FAILED` result is waited out until
    /// the timeout (a restarted job may still succeed).
    #[must_use]
    pub fn done() -> Self {
        Self {
            states: vec![ExecutionState::Ended],
            required_result: Some(ExecutionResult::Ok),
            fail_fast: false,
        }
    }

    /// Like [`JobStatusExpectation::done`], but the first `FAILED` result
    /// stops the wait.
    #[must_use]
    pub fn done_fail_fast() -> Self {
        Self {
            fail_fast: true,
            ..Self::done()
        }
    }

    /// Job has ended, whatever the result.
    #[must_use]
    pub fn ended() -> Self {
        Self::in_any_state(&[ExecutionState::Ended])
    }

    #[must_use]
    pub fn in_any_state(states: &[ExecutionState]) -> Self {
        Self {
            states: states.to_vec(),
            required_result: None,
            fail_fast: false,
        }
    }

    /// Job result is `FAILED`, in any state.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            states: Vec::new(),
            required_result: Some(ExecutionResult::Failed),
            fail_fast: false,
        }
    }

    fn state_accepted(&self, state: ExecutionState) -> bool {
        self.states.is_empty() || self.states.contains(&state)
    }

    fn result_accepted(&self, result: ExecutionResult) -> bool {
        self.required_result.is_none_or(|required| required == result)
    }

    fn summary(&self) -> String {
        let states = if self.states.is_empty() {
            "any".to_string()
        } else {
            self.states
                .iter()
                .map(ExecutionState::as_str)
                .collect::<Vec<_>>()
                .join(" | ")
        };
        match self.required_result {
            Some(result) => format!("state {states}, result {result}"),
            None => format!("state {states}"),
        }
    }
}

impl Evaluator<JobStatus> for JobStatusExpectation {
    fn evaluate(&self, status: &JobStatus) -> Decision {
        if self.fail_fast && status.result == ExecutionResult::Failed {
            return Decision::Fail(Failure::Terminal(format!(
                "job {} execution has failed, skip further attempts to check that the job will be done. \
                 Please refer to the server and PDS logs for the reason",
                status.job_uuid
            )));
        }

        if self.state_accepted(status.state) && self.result_accepted(status.result) {
            Decision::Succeed
        } else {
            Decision::Continue
        }
    }

    fn describe(&self, status: Option<&JobStatus>) -> String {
        let found = match status {
            Some(status) => format!("state {}, result {}", status.state, status.result),
            None => "no job status fetched".to_string(),
        };
        format!("Expected: {}\nFound: {found}\n", self.summary())
    }
}

/// Job status operations of a [`SecHubClient`].
#[derive(Debug, Clone, Copy)]
pub struct JobApi<'a> {
    client: &'a SecHubClient,
}

impl<'a> JobApi<'a> {
    pub(crate) fn new(client: &'a SecHubClient) -> Self {
        Self { client }
    }

    /// Fetch the current status of a job.
    ///
    /// # Errors
    ///
    /// Transport errors, non-success answers (404 while the job is not yet
    /// visible) and undecodable payloads.
    pub async fn fetch_job_status(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, SecHubError> {
        let url = self.client.sechub_endpoint(&format!(
            "/api/project/{}/job/{job_uuid}",
            encode_segment(project_id)
        ));
        self.client.get_json(&url).await
    }

    /// Poll the job status until `expectation` is met.
    ///
    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
        expectation: &JobStatusExpectation,
        settings: PollSettings,
    ) -> Result<Polled<JobStatus>, PollError> {
        info!(
            "wait for job {job_uuid} of project {project_id}: {}",
            expectation.summary()
        );
        let api = *self;
        let mut fetcher =
            poll::from_fn(move || async move { api.fetch_job_status(project_id, job_uuid).await });
        poll::poll_until(&mut fetcher, expectation, settings).await
    }

    /// Wait until the job has ended with result `OK` (1 s interval).
    ///
    /// With `fail_fast` the first `FAILED` result aborts the wait; without it
    /// a failing job is waited out until the timeout.
    ///
    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_done(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
        timeout_secs: u64,
        fail_fast: bool,
    ) -> Result<JobStatus, PollError> {
        let expectation = if fail_fast {
            JobStatusExpectation::done_fail_fast()
        } else {
            JobStatusExpectation::done()
        };
        self.wait_for_job(
            project_id,
            job_uuid,
            &expectation,
            PollSettings::seconds(timeout_secs, 1_000),
        )
        .await
        .map(|polled| polled.snapshot)
    }

    /// Wait until the job is running (5 s, 300 ms interval).
    ///
    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_running(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, PollError> {
        self.wait_in_states(
            project_id,
            job_uuid,
            &[ExecutionState::Started],
            PollSettings::seconds(5, 300),
        )
        .await
    }

    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_cancel_requested_or_canceled(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, PollError> {
        self.wait_in_states(
            project_id,
            job_uuid,
            &[ExecutionState::CancelRequested, ExecutionState::Canceled],
            PollSettings::seconds(5, 1_000),
        )
        .await
    }

    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_canceled(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, PollError> {
        self.wait_in_states(
            project_id,
            job_uuid,
            &[ExecutionState::Canceled],
            PollSettings::seconds(5, 1_000),
        )
        .await
    }

    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_suspended(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, PollError> {
        self.wait_in_states(
            project_id,
            job_uuid,
            &[ExecutionState::Suspended],
            PollSettings::seconds(5, 1_000),
        )
        .await
    }

    /// Wait until the job result is `FAILED`.
    ///
    /// # Errors
    ///
    /// Any [`PollError`] of the poll loop.
    pub async fn wait_for_job_failed(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
    ) -> Result<JobStatus, PollError> {
        self.wait_for_job(
            project_id,
            job_uuid,
            &JobStatusExpectation::failed(),
            PollSettings::seconds(5, 1_000),
        )
        .await
        .map(|polled| polled.snapshot)
    }

    async fn wait_in_states(
        &self,
        project_id: &str,
        job_uuid: &Uuid,
        states: &[ExecutionState],
        settings: PollSettings,
    ) -> Result<JobStatus, PollError> {
        self.wait_for_job(
            project_id,
            job_uuid,
            &JobStatusExpectation::in_any_state(states),
            settings,
        )
        .await
        .map(|polled| polled.snapshot)
    }
}
