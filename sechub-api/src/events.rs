//! Event inspection.
//!
//! The SecHub server can record every domain event it sends: which class
//! sent which event id (synchronously or not) and which classes received it.
//! Tests start the recorder, trigger a use case and then assert the recorded
//! trace against an [`EventExpectation`].
//!
//! Receivers are handled asynchronously, so the trace grows for a while after
//! the triggering call has returned. [`EventInspectionApi::assert_events`]
//! therefore first waits until the expected number of senders and receivers
//! is recorded and only then compares the content.

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::SecHubError;
use crate::client::SecHubClient;
use crate::compare::compare_inspections;
use crate::diagnostics;
use crate::poll::{
    self, Decision, Evaluator, Failure, PollContext, PollError, PollSettings, SnapshotFetcher,
};

const INSPECTION_PATH: &str = "/api/anonymous/integrationtest/event/inspection";

/// Upper bound for [`EventInspectionApi::wait_until_no_new_events`].
pub const NO_NEW_EVENTS_MAX_WAIT: Duration = Duration::from_secs(120);

/// One recorded event: sender, event id, synchronicity and receivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub sender_class_name: String,
    pub event_id: String,
    #[serde(rename = "synchron", alias = "synchronous", default)]
    pub synchronous: bool,
    #[serde(default)]
    pub receiver_class_names: BTreeSet<String>,
}

impl Inspection {
    pub fn new(sender: &str, event_id: &str, synchronous: bool, receivers: &[&str]) -> Self {
        Self {
            sender_class_name: sender.to_string(),
            event_id: event_id.to_string(),
            synchronous,
            receiver_class_names: receivers.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    /// Same sender, event id and synchronicity; receivers may differ.
    #[must_use]
    pub fn same_event(&self, other: &Inspection) -> bool {
        self.sender_class_name == other.sender_class_name
            && self.event_id == other.event_id
            && self.synchronous == other.synchronous
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.synchronous { "sync" } else { "async" };
        let receivers: Vec<&str> = self.receiver_class_names.iter().map(String::as_str).collect();
        write!(
            f,
            "{kind} {} from {} to [{}]",
            self.event_id,
            self.sender_class_name,
            receivers.join(", ")
        )
    }
}

/// Snapshot of the server's event recorder, keyed by inspection id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventHistory {
    #[serde(rename = "idToInspectionMap", default)]
    pub id_to_inspection: BTreeMap<u32, Inspection>,
}

impl EventHistory {
    #[must_use]
    pub fn sender_count(&self) -> usize {
        self.id_to_inspection.len()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.id_to_inspection
            .values()
            .map(|inspection| inspection.receiver_class_names.len())
            .sum()
    }

    pub fn inspections(&self) -> impl Iterator<Item = &Inspection> {
        self.id_to_inspection.values()
    }

    /// Write the history as pretty JSON to
    /// `{dir}/{id}/{id}.json` or `{dir}/{id}/{id}_{variant}.json` (id in lower
    /// case). Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::Io` when the directory or file cannot be written.
    pub fn write_to_dir(
        &self,
        dir: &Path,
        id: &str,
        variant: Option<&str>,
    ) -> Result<PathBuf, SecHubError> {
        let path = history_file_path(dir, id, variant);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!("event history written to {}", path.display());
        Ok(path)
    }
}

fn history_file_path(dir: &Path, id: &str, variant: Option<&str>) -> PathBuf {
    let stem = id.to_lowercase();
    let file_name = match variant.filter(|v| !v.is_empty()) {
        Some(variant) => format!("{stem}_{variant}.json"),
        None => format!("{stem}.json"),
    };
    dir.join(&stem).join(file_name)
}

/// One expected event as declared by a test (or loaded from JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedEvent {
    pub event_id: String,
    #[serde(default)]
    pub sender_class_name: String,
    #[serde(rename = "synchron", alias = "synchronous", default)]
    pub synchronous: bool,
    #[serde(default)]
    pub receiver_class_names: Vec<String>,
}

impl ExpectedEvent {
    fn new(event_id: String, synchronous: bool) -> Self {
        Self {
            event_id,
            sender_class_name: String::new(),
            synchronous,
            receiver_class_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn to_inspection(&self) -> Inspection {
        Inspection {
            sender_class_name: self.sender_class_name.clone(),
            event_id: self.event_id.clone(),
            synchronous: self.synchronous,
            receiver_class_names: self.receiver_class_names.iter().cloned().collect(),
        }
    }
}

/// Immutable list of expected events. Build it with
/// [`EventExpectation::builder`] or load it from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventExpectation {
    inspections: Vec<Inspection>,
}

impl EventExpectation {
    #[must_use]
    pub fn builder() -> EventExpectationBuilder {
        EventExpectationBuilder::default()
    }

    pub fn from_events(events: &[ExpectedEvent]) -> Self {
        Self {
            inspections: events.iter().map(ExpectedEvent::to_inspection).collect(),
        }
    }

    /// Parse a JSON array of [`ExpectedEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns `SecHubError::Serialization` for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, SecHubError> {
        let events: Vec<ExpectedEvent> = serde_json::from_str(json)?;
        Ok(Self::from_events(&events))
    }

    #[must_use]
    pub fn inspections(&self) -> &[Inspection] {
        &self.inspections
    }

    #[must_use]
    pub fn expected_senders(&self) -> usize {
        self.inspections.len()
    }

    #[must_use]
    pub fn expected_receivers(&self) -> usize {
        self.inspections
            .iter()
            .map(|inspection| inspection.receiver_class_names.len())
            .sum()
    }
}

impl Evaluator<EventHistory> for EventExpectation {
    fn evaluate(&self, history: &EventHistory) -> Decision {
        if history.sender_count() < self.expected_senders()
            || history.receiver_count() < self.expected_receivers()
        {
            return Decision::Continue;
        }

        let actual: Vec<Inspection> = history.inspections().cloned().collect();
        let comparison = compare_inspections(&self.inspections, &actual);
        if comparison.is_match() {
            Decision::Succeed
        } else {
            Decision::Fail(Failure::Mismatch(comparison))
        }
    }

    fn describe(&self, history: Option<&EventHistory>) -> String {
        let (senders, receivers) = history.map_or((0, 0), |h| (h.sender_count(), h.receiver_count()));
        format!(
            "Expected:\n - senders: {}\n - receivers: {}\nFound:\n - senders: {senders}\n - receivers: {receivers}\n",
            self.expected_senders(),
            self.expected_receivers()
        )
    }

    fn proposal(&self, history: &EventHistory) -> Option<String> {
        Some(diagnostics::proposal_snippet(history))
    }
}

/// Collects expected events. Each `async_event`/`sync_event` call opens a
/// new entry that is completed with `from` and `to`.
#[derive(Debug, Default)]
pub struct EventExpectationBuilder {
    events: Vec<ExpectedEvent>,
}

impl EventExpectationBuilder {
    pub fn async_event(self, event_id: impl Into<String>) -> EventEntryBuilder {
        EventEntryBuilder {
            builder: self,
            current: ExpectedEvent::new(event_id.into(), false),
        }
    }

    pub fn sync_event(self, event_id: impl Into<String>) -> EventEntryBuilder {
        EventEntryBuilder {
            builder: self,
            current: ExpectedEvent::new(event_id.into(), true),
        }
    }

    #[must_use]
    pub fn build(self) -> EventExpectation {
        EventExpectation::from_events(&self.events)
    }
}

/// Entry under construction inside an [`EventExpectationBuilder`].
#[derive(Debug)]
pub struct EventEntryBuilder {
    builder: EventExpectationBuilder,
    current: ExpectedEvent,
}

impl EventEntryBuilder {
    #[must_use]
    pub fn from(mut self, sender_class_name: impl Into<String>) -> Self {
        self.current.sender_class_name = sender_class_name.into();
        self
    }

    #[must_use]
    pub fn to(mut self, receiver_class_names: &[&str]) -> Self {
        self.current
            .receiver_class_names
            .extend(receiver_class_names.iter().map(|r| (*r).to_string()));
        self
    }

    pub fn async_event(self, event_id: impl Into<String>) -> EventEntryBuilder {
        self.finish().async_event(event_id)
    }

    pub fn sync_event(self, event_id: impl Into<String>) -> EventEntryBuilder {
        self.finish().sync_event(event_id)
    }

    #[must_use]
    pub fn build(self) -> EventExpectation {
        self.finish().build()
    }

    fn finish(mut self) -> EventExpectationBuilder {
        self.builder.events.push(self.current);
        self.builder
    }
}

/// State of the server's event recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionStatus {
    #[serde(deserialize_with = "lenient")]
    pub started: bool,
    #[serde(deserialize_with = "lenient")]
    pub last_inspection_id: u64,
}

/// The status endpoint answers with string values (`"true"`, `"12"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Value(T),
    Text(String),
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Lenient::<T>::deserialize(deserializer)? {
        Lenient::Value(value) => Ok(value),
        Lenient::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Event inspection operations of a [`SecHubClient`].
#[derive(Debug, Clone, Copy)]
pub struct EventInspectionApi<'a> {
    client: &'a SecHubClient,
}

impl<'a> EventInspectionApi<'a> {
    pub(crate) fn new(client: &'a SecHubClient) -> Self {
        Self { client }
    }

    fn endpoint(&self, action: &str) -> String {
        self.client
            .sechub_endpoint(&format!("{INSPECTION_PATH}/{action}"))
    }

    /// Start recording. Waits until the server stopped producing events
    /// (five stable checks, 300 ms apart) so the new trace is not polluted by
    /// earlier activity.
    ///
    /// # Errors
    ///
    /// `PollError::Timeout` when events keep coming for two minutes,
    /// `PollError::Fetch` for transport problems.
    pub async fn start(&self) -> Result<(), PollError> {
        self.start_with_interval(Duration::from_millis(300)).await
    }

    /// [`start`](Self::start) with a custom pause between the stability
    /// checks.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn start_with_interval(&self, interval: Duration) -> Result<(), PollError> {
        self.wait_until_no_new_events(5, interval).await?;
        self.client
            .post::<()>(&self.endpoint("start"), None)
            .await?;
        info!("event inspection started");
        Ok(())
    }

    /// Stop recording and clear the recorded trace.
    ///
    /// # Errors
    ///
    /// Transport errors and non-success answers.
    pub async fn reset_and_stop(&self) -> Result<(), SecHubError> {
        self.client
            .post::<()>(&self.endpoint("reset-and-stop"), None)
            .await?;
        info!("event inspection reset and stopped");
        Ok(())
    }

    /// # Errors
    ///
    /// Transport errors, non-success answers and undecodable payloads.
    pub async fn status(&self) -> Result<InspectionStatus, SecHubError> {
        self.client.get_json(&self.endpoint("status")).await
    }

    /// # Errors
    ///
    /// Transport errors, non-success answers and undecodable payloads.
    pub async fn fetch_history(&self) -> Result<EventHistory, SecHubError> {
        self.client.get_json(&self.endpoint("history")).await
    }

    /// Wait until the last inspection id did not change for
    /// `min_stable_checks` consecutive checks, `interval` apart. Gives up
    /// after [`NO_NEW_EVENTS_MAX_WAIT`]. Returns the settled id.
    ///
    /// # Errors
    ///
    /// `PollError::Timeout` when the id never settles, `PollError::Fetch` for
    /// non-transient fetch errors.
    pub async fn wait_until_no_new_events(
        &self,
        min_stable_checks: u32,
        interval: Duration,
    ) -> Result<u64, PollError> {
        let api = *self;
        let mut fetcher = poll::from_fn(move || async move {
            api.status().await.map(|status| status.last_inspection_id)
        });
        wait_until_stable(
            &mut fetcher,
            min_stable_checks,
            PollSettings::new(NO_NEW_EVENTS_MAX_WAIT, interval),
        )
        .await
    }

    /// Wait until the recorded trace holds as many senders and receivers as
    /// expected, then compare it structurally. Polls every second.
    ///
    /// Returns the matching history.
    ///
    /// # Errors
    ///
    /// - `PollError::Precondition` when the inspection was not started
    /// - `PollError::StructuralMismatch` when the counts are reached but the
    ///   content differs (including more events than expected)
    /// - `PollError::Timeout` when the counts are never reached
    pub async fn assert_events(
        &self,
        expectation: &EventExpectation,
        timeout: Duration,
    ) -> Result<EventHistory, PollError> {
        self.assert_events_with(
            expectation,
            PollSettings::new(timeout, Duration::from_secs(1)),
        )
        .await
    }

    /// [`assert_events`](Self::assert_events) with explicit poll settings.
    ///
    /// # Errors
    ///
    /// Same as [`assert_events`](Self::assert_events).
    pub async fn assert_events_with(
        &self,
        expectation: &EventExpectation,
        settings: PollSettings,
    ) -> Result<EventHistory, PollError> {
        if !self.status().await?.started {
            return Err(PollError::Precondition(
                "event inspection is not started, call start() before asserting events"
                    .to_string(),
            ));
        }

        info!(
            "wait for {} sender(s) and {} receiver(s) in event history",
            expectation.expected_senders(),
            expectation.expected_receivers()
        );
        let api = *self;
        let mut fetcher = poll::from_fn(move || async move { api.fetch_history().await });
        let polled = poll::poll_until(&mut fetcher, expectation, settings).await?;
        Ok(polled.snapshot)
    }

    /// Wait, fetch the recorded trace and fail with a ready-to-paste
    /// expectation for it. Used while writing a new event test.
    pub async fn propose_expectation(&self, wait: Duration) -> PollError {
        tokio::time::sleep(wait).await;

        let history = match self.fetch_history().await {
            Ok(history) => history,
            Err(error) => return PollError::Fetch(error),
        };
        let proposal = diagnostics::proposal_snippet(&history);
        let report = diagnostics::describe(
            "Unimplemented event expectation, use the generated snippet below",
            "",
            Some(&history),
            wait,
            1,
            Some(&proposal),
        );

        PollError::TerminalFailure {
            reason: "event expectation proposal generated".to_string(),
            attempts: 1,
            report,
        }
    }
}

/// Poll a counter until it stays unchanged for `min_stable_checks`
/// consecutive fetches. Transient fetch errors break the streak.
pub(crate) async fn wait_until_stable<F>(
    fetcher: &mut F,
    min_stable_checks: u32,
    settings: PollSettings,
) -> Result<u64, PollError>
where
    F: SnapshotFetcher<u64>,
{
    let mut context = PollContext::start(settings);
    let mut current: Option<u64> = None;
    let mut stable_checks = 0u32;

    loop {
        context.record_attempt();
        match fetcher.fetch().await {
            Ok(id) if current == Some(id) => stable_checks += 1,
            Ok(id) => {
                debug!("last inspection id changed: {current:?} -> {id}");
                current = Some(id);
                stable_checks = 0;
            }
            Err(error) if error.is_transient() => {
                warn!("could not fetch event inspection status: {error}");
                stable_checks = 0;
            }
            Err(error) => return Err(PollError::Fetch(error)),
        }

        if let Some(id) = current
            && stable_checks >= min_stable_checks
        {
            return Ok(id);
        }

        if context.is_timed_out() {
            let report = diagnostics::describe(
                "Wait until no new events failed, timeout reached",
                &format!(
                    "Expected: last inspection id stable for {min_stable_checks} checks\n\
                     Found: stable for {stable_checks} checks\n"
                ),
                current.as_ref(),
                context.elapsed(),
                context.attempts(),
                None,
            );
            return Err(PollError::Timeout {
                elapsed: context.elapsed(),
                attempts: context.attempts(),
                report,
            });
        }
        context.pause().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::poll_until;
    use crate::test_utils::ScriptedFetcher;

    fn history(inspections: Vec<Inspection>) -> EventHistory {
        EventHistory {
            id_to_inspection: inspections
                .into_iter()
                .enumerate()
                .map(|(i, inspection)| (i as u32 + 1, inspection))
                .collect(),
        }
    }

    fn user_added() -> EventExpectation {
        EventExpectation::builder()
            .async_event("USER_ADDED_TO_PROJECT")
            .from("ProjectAssignUserService")
            .to(&["ScheduleMessageHandler", "ScanMessageHandler"])
            .build()
    }

    #[test]
    fn test_history_decoding() {
        let json = r#"{
            "idToInspectionMap": {
                "2": {"senderClassName": "B", "eventId": "JOB_DONE", "synchron": true,
                      "receiverClassNames": []},
                "1": {"senderClassName": "A", "eventId": "JOB_STARTED", "synchron": false,
                      "receiverClassNames": ["Y", "X"]}
            }
        }"#;

        let history: EventHistory = serde_json::from_str(json).unwrap();

        assert_eq!(history.sender_count(), 2);
        assert_eq!(history.receiver_count(), 2);
        let first = &history.id_to_inspection[&1];
        assert_eq!(first.event_id, "JOB_STARTED");
        assert_eq!(
            first.receiver_class_names.iter().collect::<Vec<_>>(),
            vec!["X", "Y"]
        );
        assert!(history.id_to_inspection[&2].synchronous);
    }

    #[test]
    fn test_empty_history_decoding() {
        let history: EventHistory = serde_json::from_str("{}").unwrap();
        assert_eq!(history.sender_count(), 0);
    }

    #[test]
    fn test_status_decoding_accepts_strings() {
        let status: InspectionStatus =
            serde_json::from_str(r#"{"lastInspectionId": "12", "started": "true"}"#).unwrap();
        assert_eq!(
            status,
            InspectionStatus {
                started: true,
                last_inspection_id: 12
            }
        );

        let status: InspectionStatus =
            serde_json::from_str(r#"{"lastInspectionId": 3, "started": false}"#).unwrap();
        assert!(!status.started);
        assert_eq!(status.last_inspection_id, 3);
    }

    #[test]
    fn test_builder_counts() {
        let expectation = EventExpectation::builder()
            .async_event("A")
            .from("S1")
            .to(&["R1", "R2"])
            .sync_event("B")
            .from("S2")
            .to(&[])
            .async_event("C")
            .from("S3")
            .to(&["R3"])
            .build();

        assert_eq!(expectation.expected_senders(), 3);
        assert_eq!(expectation.expected_receivers(), 3);
        assert!(expectation.inspections()[1].synchronous);
    }

    #[test]
    fn test_expectation_from_json() {
        let json = r#"[
            {"eventId": "USER_ADDED_TO_PROJECT", "senderClassName": "ProjectAssignUserService",
             "synchron": false, "receiverClassNames": ["ScheduleMessageHandler", "ScanMessageHandler"]}
        ]"#;

        assert_eq!(EventExpectation::from_json(json).unwrap(), user_added());
    }

    #[test]
    fn test_evaluator_continues_below_counts() {
        let partial = history(vec![Inspection::new(
            "ProjectAssignUserService",
            "USER_ADDED_TO_PROJECT",
            false,
            &["ScheduleMessageHandler"],
        )]);

        assert_eq!(user_added().evaluate(&partial), Decision::Continue);
    }

    #[test]
    fn test_evaluator_reports_overshoot_as_mismatch() {
        let overshoot = history(vec![Inspection::new(
            "ProjectAssignUserService",
            "USER_ADDED_TO_PROJECT",
            false,
            &["ScheduleMessageHandler", "ScanMessageHandler", "AdministrationMessageHandler"],
        )]);

        match user_added().evaluate(&overshoot) {
            Decision::Fail(Failure::Mismatch(comparison)) => {
                let differences = comparison.receiver_differences();
                assert_eq!(
                    differences[0].unexpected_receivers,
                    vec!["AdministrationMessageHandler".to_string()]
                );
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_describe_counts() {
        let text = user_added().describe(None);
        assert_eq!(
            text,
            "Expected:\n - senders: 1\n - receivers: 2\nFound:\n - senders: 0\n - receivers: 0\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_poll_matches() {
        let mut fetcher = ScriptedFetcher::new(vec![
            history(vec![Inspection::new(
                "ProjectAssignUserService",
                "USER_ADDED_TO_PROJECT",
                false,
                &["ScanMessageHandler"],
            )]),
            history(vec![Inspection::new(
                "ProjectAssignUserService",
                "USER_ADDED_TO_PROJECT",
                false,
                &["ScanMessageHandler", "ScheduleMessageHandler"],
            )]),
        ]);

        let polled = poll_until(&mut fetcher, &user_added(), PollSettings::from_millis(3_000, 1_000))
            .await
            .unwrap();

        assert_eq!(polled.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_structural_mismatch_contains_proposal() {
        let mut fetcher = ScriptedFetcher::new(vec![history(vec![Inspection::new(
            "OtherService",
            "USER_ADDED_TO_PROJECT",
            false,
            &["ScanMessageHandler", "ScheduleMessageHandler"],
        )])]);

        let error = poll_until(&mut fetcher, &user_added(), PollSettings::from_millis(3_000, 1_000))
            .await
            .unwrap_err();

        match &error {
            PollError::StructuralMismatch { comparison, .. } => {
                assert_eq!(comparison.missing.len(), 1);
                assert_eq!(comparison.unexpected.len(), 1);
            }
            other => panic!("expected structural mismatch, got {other:?}"),
        }
        let report = error.report().unwrap();
        assert!(report.contains(".from(\"OtherService\")"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_stable() {
        let mut fetcher = ScriptedFetcher::new(vec![1, 2, 2, 5]);

        let id = wait_until_stable(&mut fetcher, 3, PollSettings::from_millis(10_000, 300))
            .await
            .unwrap();

        assert_eq!(id, 5);
        // 1, 2, 2, 5 then three stable repeats of 5
        assert_eq!(fetcher.calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_stable_times_out() {
        let mut counter = 0u64;
        let mut fetcher = poll::from_fn(move || {
            counter += 1;
            std::future::ready(Ok::<u64, SecHubError>(counter))
        });

        let error = wait_until_stable(&mut fetcher, 2, PollSettings::from_millis(1_000, 300))
            .await
            .unwrap_err();

        assert!(matches!(error, PollError::Timeout { .. }));
    }

    #[test]
    fn test_history_file_path() {
        let dir = Path::new("/tmp/event-trace");

        assert_eq!(
            history_file_path(dir, "UC_ADMIN_ASSIGNS_USER", None),
            dir.join("uc_admin_assigns_user/uc_admin_assigns_user.json")
        );
        assert_eq!(
            history_file_path(dir, "UC_X", Some("pds")),
            dir.join("uc_x/uc_x_pds.json")
        );
    }

    #[test]
    fn test_write_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let history = history(vec![Inspection::new("A", "E", false, &["R"])]);

        let path = history.write_to_dir(dir.path(), "UC_TEST", None).unwrap();

        let written: EventHistory =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, history);
    }
}
