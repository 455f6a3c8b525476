//! Auto-cleanup delete count verification.
//!
//! SecHub and PDS delete old data on their own timer. In integration test
//! mode both servers count every delete per `(variant, class name)` pair and
//! expose the counters, so tests can wait until the expected deletes have
//! happened, or prove that nothing was deleted at all.

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;

use crate::SecHubError;
use crate::client::SecHubClient;
use crate::poll::{self, Decision, Evaluator, Failure, PollError, PollSettings};

const INSPECTION_PATH: &str = "/api/anonymous/integrationtest/autocleanup/inspection";

/// One delete counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCount {
    pub variant: String,
    pub class_name: String,
    #[serde(rename = "deleteCount")]
    pub count: u64,
}

impl DeleteCount {
    pub fn new(variant: &str, class_name: &str, count: u64) -> Self {
        Self {
            variant: variant.to_string(),
            class_name: class_name.to_string(),
            count,
        }
    }

    fn same_pair(&self, other: &DeleteCount) -> bool {
        self.variant == other.variant && self.class_name == other.class_name
    }
}

/// Expected delete counters.
///
/// Counters for pairs that are not declared are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCountExpectation {
    /// Every declared pair has exactly the declared count
    Counts(Vec<DeleteCount>),
    /// No delete happens during the whole wait. An empty counter list only
    /// means "nothing yet": success needs the full timeout to pass without
    /// a single entry.
    NeverAnyDelete,
}

impl DeleteCountExpectation {
    /// Expect `(variant, class name, count)` triples.
    #[must_use]
    pub fn expect(entries: &[(&str, &str, u64)]) -> Self {
        DeleteCountExpectation::Counts(
            entries
                .iter()
                .map(|(variant, class_name, count)| DeleteCount::new(variant, class_name, *count))
                .collect(),
        )
    }

    #[must_use]
    pub fn never_any_delete() -> Self {
        DeleteCountExpectation::NeverAnyDelete
    }

    /// Parse a JSON array of delete counts (same format the servers return).
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::Serialization` for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, SecHubError> {
        Ok(DeleteCountExpectation::Counts(serde_json::from_str(json)?))
    }

    /// Every problem of a snapshot, one line each.
    fn problems(&self, found: &[DeleteCount]) -> Vec<String> {
        match self {
            DeleteCountExpectation::NeverAnyDelete => found
                .iter()
                .map(|entry| {
                    format!(
                        "{} {}: {} delete(s), expected none",
                        entry.variant, entry.class_name, entry.count
                    )
                })
                .collect(),
            DeleteCountExpectation::Counts(expected) => expected
                .iter()
                .filter_map(|wanted| {
                    match found.iter().find(|entry| entry.same_pair(wanted)) {
                        Some(entry) if entry.count == wanted.count => None,
                        Some(entry) => Some(format!(
                            "{} {}: expected {} delete(s) but was {}",
                            wanted.variant, wanted.class_name, wanted.count, entry.count
                        )),
                        None => Some(format!(
                            "{} {}: expected {} delete(s) but no entry found",
                            wanted.variant, wanted.class_name, wanted.count
                        )),
                    }
                })
                .collect(),
        }
    }
}

impl Evaluator<Vec<DeleteCount>> for DeleteCountExpectation {
    fn evaluate(&self, found: &Vec<DeleteCount>) -> Decision {
        match self {
            DeleteCountExpectation::NeverAnyDelete if found.is_empty() => Decision::Quiescent,
            DeleteCountExpectation::NeverAnyDelete => Decision::Fail(Failure::Terminal(format!(
                "auto cleanup deleted data although no delete was expected: {}",
                self.problems(found).join("; ")
            ))),
            DeleteCountExpectation::Counts(_) => {
                if self.problems(found).is_empty() {
                    Decision::Succeed
                } else {
                    Decision::Continue
                }
            }
        }
    }

    fn describe(&self, found: Option<&Vec<DeleteCount>>) -> String {
        let mut text = String::new();
        match self {
            DeleteCountExpectation::NeverAnyDelete => text.push_str("Expected: no delete at all\n"),
            DeleteCountExpectation::Counts(expected) => {
                text.push_str("Expected delete counts:\n");
                for entry in expected {
                    let _ = writeln!(
                        text,
                        " - {} {}: {}",
                        entry.variant, entry.class_name, entry.count
                    );
                }
            }
        }

        match found {
            None => text.push_str("Found: no delete counts fetched\n"),
            Some(found) => {
                let problems = self.problems(found);
                if problems.is_empty() {
                    text.push_str("Found: no problems\n");
                } else {
                    text.push_str("Problems:\n");
                    for problem in problems {
                        let _ = writeln!(text, " - {problem}");
                    }
                }
            }
        }
        text
    }
}

/// Which server's cleanup inspector to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanupTarget {
    SecHub,
    Pds,
}

/// Auto-cleanup inspection operations of either the SecHub server or the
/// PDS.
#[derive(Debug, Clone, Copy)]
pub struct AutoCleanupApi<'a> {
    client: &'a SecHubClient,
    target: CleanupTarget,
}

impl<'a> AutoCleanupApi<'a> {
    /// 15 seconds, checked every second.
    pub const DEFAULT_SETTINGS: PollSettings = PollSettings {
        timeout: Duration::from_secs(15),
        interval: Duration::from_secs(1),
    };

    #[must_use]
    pub fn for_sechub(client: &'a SecHubClient) -> Self {
        Self {
            client,
            target: CleanupTarget::SecHub,
        }
    }

    #[must_use]
    pub fn for_pds(client: &'a SecHubClient) -> Self {
        Self {
            client,
            target: CleanupTarget::Pds,
        }
    }

    fn endpoint(&self, action: &str) -> Result<String, SecHubError> {
        let path = format!("{INSPECTION_PATH}/{action}");
        match self.target {
            CleanupTarget::SecHub => Ok(self.client.sechub_endpoint(&path)),
            CleanupTarget::Pds => self.client.pds_endpoint(&path),
        }
    }

    fn server_name(&self) -> &'static str {
        match self.target {
            CleanupTarget::SecHub => "SecHub",
            CleanupTarget::Pds => "PDS",
        }
    }

    /// # Errors
    ///
    /// Missing PDS URL (PDS target), transport errors, non-success answers
    /// and undecodable payloads.
    pub async fn fetch_delete_counts(&self) -> Result<Vec<DeleteCount>, SecHubError> {
        self.client.get_json(&self.endpoint("deleteCounts")?).await
    }

    /// Reset all delete counters.
    ///
    /// # Errors
    ///
    /// Missing PDS URL (PDS target), transport errors and non-success
    /// answers.
    pub async fn reset_inspection(&self) -> Result<(), SecHubError> {
        self.client
            .post::<()>(&self.endpoint("reset")?, None)
            .await?;
        info!("{} auto cleanup inspection reset", self.server_name());
        Ok(())
    }

    /// Poll the delete counters until `expectation` holds. Returns the last
    /// fetched counters.
    ///
    /// # Errors
    ///
    /// - `PollError::Timeout` listing every mismatching counter
    /// - `PollError::TerminalFailure` when a never-any-delete expectation
    ///   sees a delete
    pub async fn assert_delete_counts(
        &self,
        expectation: &DeleteCountExpectation,
        settings: PollSettings,
    ) -> Result<Vec<DeleteCount>, PollError> {
        info!(
            "wait for {} auto cleanup delete counts ({} ms timeout)",
            self.server_name(),
            settings.timeout.as_millis()
        );
        let api = *self;
        let mut fetcher = poll::from_fn(move || async move { api.fetch_delete_counts().await });
        let polled = poll::poll_until(&mut fetcher, expectation, settings).await?;
        Ok(polled.snapshot)
    }
}
