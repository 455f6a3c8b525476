//! Generic eventual-state poll loop.
//!
//! A wait call fetches a snapshot of remote state, lets an [`Evaluator`]
//! decide what to do with it and repeats at a fixed interval until the
//! evaluator succeeds, fails, or the timeout budget is spent.
//!
//! ```text
//!            +---------+  Succeed            +------+
//!   start -->| WAITING |-------------------->| DONE |
//!            +---------+                     +------+
//!             |  ^   |   Fail(reason)        +--------+
//!     Continue|  |   +---------------------->| FAILED |
//!    Quiescent|  |                           +--------+
//!             v  |sleep                      +-----------+
//!          timeout? ----- yes -------------->| TIMED_OUT |  (Quiescent: DONE)
//!                                            +-----------+
//! ```
//!
//! The loop runs on the caller's task. There are no background workers and
//! no cancellation other than the timeout.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::SecHubError;
use crate::compare::ComparisonResult;
use crate::diagnostics;

/// Timing discipline of one wait call.
///
/// `interval` should be greater than zero whenever more than one attempt is
/// expected. A `timeout` shorter than `interval` degenerates to one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }

    /// Timeout in seconds, interval in milliseconds (the combination used by
    /// most call sites).
    pub fn seconds(timeout_secs: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_millis(interval_ms),
        )
    }
}

/// Transient state of a single wait call. Created when the wait starts and
/// dropped when it ends.
#[derive(Debug)]
pub struct PollContext {
    start: Instant,
    timeout: Duration,
    interval: Duration,
    attempts: u32,
}

impl PollContext {
    pub fn start(settings: PollSettings) -> Self {
        Self {
            start: Instant::now(),
            timeout: settings.timeout,
            interval: settings.interval,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Sleep for one interval, but never past the deadline.
    pub async fn pause(&self) {
        let delay = self.interval.min(self.remaining());
        tokio::time::sleep(delay).await;
    }
}

/// Why an evaluator gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The remote side reports a state that will not recover
    Terminal(String),
    /// Quantities were reached but the content differs
    Mismatch(ComparisonResult),
}

/// Verdict of an [`Evaluator`] over one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Not there yet, poll again
    Continue,
    /// Target state reached
    Succeed,
    /// Nothing happened (yet). Poll again; reaching the timeout in this state
    /// counts as success.
    Quiescent,
    /// Stop immediately, retrying cannot help
    Fail(Failure),
}

/// Decides over a snapshot. Evaluation must be pure: no remote calls and no
/// mutation.
pub trait Evaluator<S> {
    fn evaluate(&self, snapshot: &S) -> Decision;

    /// Expected vs. found summary used in failure reports.
    fn describe(&self, snapshot: Option<&S>) -> String;

    /// Optional ready-to-paste expectation reconstructed from a snapshot.
    fn proposal(&self, _snapshot: &S) -> Option<String> {
        None
    }
}

/// One remote read per call. Implementations must not cache between calls
/// and must not change remote state.
pub trait SnapshotFetcher<S> {
    fn fetch(&mut self) -> impl Future<Output = Result<S, SecHubError>>;
}

/// Fetcher backed by a closure returning a future.
pub struct FromFn<F>(F);

/// Wrap a closure as a [`SnapshotFetcher`].
pub fn from_fn<S, F, Fut>(f: F) -> FromFn<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, SecHubError>>,
{
    FromFn(f)
}

impl<S, F, Fut> SnapshotFetcher<S> for FromFn<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, SecHubError>>,
{
    fn fetch(&mut self) -> impl Future<Output = Result<S, SecHubError>> {
        (self.0)()
    }
}

/// Successful outcome of [`poll_until`].
#[derive(Debug, Clone)]
pub struct Polled<S> {
    /// The snapshot that satisfied the evaluator (for quiescent waits: the
    /// last one observed)
    pub snapshot: S,
    pub fetched_at: DateTime<Utc>,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Failure taxonomy of a wait call. Every variant that can carry a snapshot
/// carries the full diagnostic report.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Remote reported an unrecoverable state after {attempts} attempt(s): {reason}\n{report}")]
    TerminalFailure {
        reason: String,
        attempts: u32,
        report: String,
    },
    #[error("Timed out after {} ms and {attempts} attempt(s)\n{report}", .elapsed.as_millis())]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        report: String,
    },
    #[error("Structural mismatch after {attempts} attempt(s)\n{report}")]
    StructuralMismatch {
        comparison: ComparisonResult,
        attempts: u32,
        report: String,
    },
    #[error("Fetching remote state failed: {0}")]
    Fetch(#[from] SecHubError),
    #[error("Precondition failed: {0}")]
    Precondition(String),
}

impl PollError {
    /// The diagnostic report, when the error has one.
    #[must_use]
    pub fn report(&self) -> Option<&str> {
        match self {
            PollError::TerminalFailure { report, .. }
            | PollError::Timeout { report, .. }
            | PollError::StructuralMismatch { report, .. } => Some(report),
            PollError::Fetch(_) | PollError::Precondition(_) => None,
        }
    }

    /// Append extra diagnostic text (e.g. PDS output streams) to the report.
    #[must_use]
    pub fn with_appended_report(mut self, extra: &str) -> Self {
        match &mut self {
            PollError::TerminalFailure { report, .. }
            | PollError::Timeout { report, .. }
            | PollError::StructuralMismatch { report, .. } => {
                report.push_str(extra);
            }
            PollError::Fetch(_) | PollError::Precondition(_) => {}
        }
        self
    }
}

/// Poll `fetcher` until `evaluator` succeeds, fails, or `settings.timeout`
/// elapses.
///
/// The first attempt happens immediately, so a target state that already
/// holds returns without sleeping. Transient fetch errors count as attempts
/// without a snapshot; non-transient ones abort the wait. A single fetch
/// (including the client's own transport retries) is cut off at the
/// remaining budget.
///
/// A quiescent wait succeeds at the timeout only if every attempt produced a
/// snapshot; one unobserved attempt turns it into a timeout.
///
/// # Errors
///
/// - `PollError::TerminalFailure` when the evaluator fails on a snapshot
/// - `PollError::StructuralMismatch` when the evaluator reports a content
///   mismatch
/// - `PollError::Timeout` when the budget is spent without success
/// - `PollError::Fetch` for a non-transient fetch error
pub async fn poll_until<S, F, E>(
    fetcher: &mut F,
    evaluator: &E,
    settings: PollSettings,
) -> Result<Polled<S>, PollError>
where
    S: Serialize,
    F: SnapshotFetcher<S>,
    E: Evaluator<S> + ?Sized,
{
    let mut context = PollContext::start(settings);
    let mut last: Option<(S, DateTime<Utc>)> = None;
    let mut last_error: Option<SecHubError>;
    let mut quiescent = false;
    // A quiet window only counts when every attempt saw the remote side
    let mut fully_observed = true;

    loop {
        let attempt = context.record_attempt();

        let budget = context.remaining();
        let fetched = match tokio::time::timeout(budget, fetcher.fetch()).await {
            Ok(fetched) => fetched,
            Err(_) => Err(SecHubError::Timeout(format!(
                "no answer within the remaining {} ms of the wait",
                budget.as_millis()
            ))),
        };

        match fetched {
            Ok(snapshot) => {
                let fetched_at = Utc::now();
                let decision = evaluator.evaluate(&snapshot);
                debug!(
                    "poll attempt {attempt} after {} ms: {decision:?}",
                    context.elapsed().as_millis()
                );

                match decision {
                    Decision::Succeed => {
                        info!(
                            "wait satisfied after {attempt} attempt(s) and {} ms",
                            context.elapsed().as_millis()
                        );
                        return Ok(Polled {
                            snapshot,
                            fetched_at,
                            attempts: attempt,
                            elapsed: context.elapsed(),
                        });
                    }
                    Decision::Fail(Failure::Terminal(reason)) => {
                        let report = diagnostics::describe(
                            &format!("Remote state is terminal: {reason}"),
                            &evaluator.describe(Some(&snapshot)),
                            Some(&snapshot),
                            context.elapsed(),
                            attempt,
                            evaluator.proposal(&snapshot).as_deref(),
                        );
                        return Err(PollError::TerminalFailure {
                            reason,
                            attempts: attempt,
                            report,
                        });
                    }
                    Decision::Fail(Failure::Mismatch(comparison)) => {
                        let mut report = diagnostics::describe_mismatch(&comparison);
                        report.push_str(&diagnostics::describe(
                            "Found entries differ from expectation",
                            &evaluator.describe(Some(&snapshot)),
                            Some(&snapshot),
                            context.elapsed(),
                            attempt,
                            evaluator.proposal(&snapshot).as_deref(),
                        ));
                        return Err(PollError::StructuralMismatch {
                            comparison,
                            attempts: attempt,
                            report,
                        });
                    }
                    Decision::Quiescent => quiescent = true,
                    Decision::Continue => quiescent = false,
                }

                last = Some((snapshot, fetched_at));
                last_error = None;
            }
            Err(error) if error.is_transient() => {
                warn!("poll attempt {attempt} could not fetch remote state: {error}");
                quiescent = false;
                fully_observed = false;
                last_error = Some(error);
            }
            Err(error) => return Err(PollError::Fetch(error)),
        }

        if !context.is_timed_out() {
            context.pause().await;
        }
        if context.is_timed_out() {
            return timed_out(
                &context,
                evaluator,
                last,
                last_error,
                quiescent && fully_observed,
            );
        }
    }
}

fn timed_out<S, E>(
    context: &PollContext,
    evaluator: &E,
    last: Option<(S, DateTime<Utc>)>,
    last_error: Option<SecHubError>,
    quiescent: bool,
) -> Result<Polled<S>, PollError>
where
    S: Serialize,
    E: Evaluator<S> + ?Sized,
{
    match last {
        Some((snapshot, fetched_at)) if quiescent => {
            info!(
                "remote stayed quiescent for {} ms ({} attempts)",
                context.elapsed().as_millis(),
                context.attempts()
            );
            Ok(Polled {
                snapshot,
                fetched_at,
                attempts: context.attempts(),
                elapsed: context.elapsed(),
            })
        }
        last => {
            let snapshot = last.as_ref().map(|(snapshot, _)| snapshot);
            let mut report = diagnostics::describe(
                "Wait for expected remote state timed out",
                &evaluator.describe(snapshot),
                snapshot,
                context.elapsed(),
                context.attempts(),
                snapshot.and_then(|s| evaluator.proposal(s)).as_deref(),
            );
            if let Some(error) = last_error {
                report.push_str(&format!("\nLast fetch error: {error}\n"));
            }
            Err(PollError::Timeout {
                elapsed: context.elapsed(),
                attempts: context.attempts(),
                report,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedFetcher;

    /// Succeeds once the counter reaches a target, fails on a negative value.
    struct ReachCount {
        target: i64,
    }

    impl Evaluator<i64> for ReachCount {
        fn evaluate(&self, snapshot: &i64) -> Decision {
            if *snapshot < 0 {
                Decision::Fail(Failure::Terminal(format!("negative: {snapshot}")))
            } else if *snapshot >= self.target {
                Decision::Succeed
            } else {
                Decision::Continue
            }
        }

        fn describe(&self, snapshot: Option<&i64>) -> String {
            format!("Expected: {}\nFound: {snapshot:?}\n", self.target)
        }
    }

    /// Empty means quiet, anything else is a failure.
    struct StaysZero;

    impl Evaluator<i64> for StaysZero {
        fn evaluate(&self, snapshot: &i64) -> Decision {
            if *snapshot == 0 {
                Decision::Quiescent
            } else {
                Decision::Fail(Failure::Terminal(format!("changed to {snapshot}")))
            }
        }

        fn describe(&self, _snapshot: Option<&i64>) -> String {
            "Expected: always 0\n".to_string()
        }
    }

    fn not_yet_there() -> SecHubError {
        SecHubError::InvalidResponse {
            status: 404,
            message: "not yet".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_does_not_sleep() {
        let mut fetcher = ScriptedFetcher::new(vec![5]);
        let start = Instant::now();

        let polled = poll_until(
            &mut fetcher,
            &ReachCount { target: 5 },
            PollSettings::from_millis(5_000, 1_000),
        )
        .await
        .unwrap();

        assert_eq!(polled.snapshot, 5);
        assert_eq!(polled.attempts, 1);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_intervals() {
        let mut fetcher = ScriptedFetcher::new(vec![1, 1, 3]);
        let start = Instant::now();

        let polled = poll_until(
            &mut fetcher,
            &ReachCount { target: 3 },
            PollSettings::from_millis(5_000, 1_000),
        )
        .await
        .unwrap();

        assert_eq!(polled.snapshot, 3);
        assert_eq!(polled.attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_shorter_than_interval_fetches_once() {
        let mut fetcher = ScriptedFetcher::new(vec![0]);

        let result = poll_until(
            &mut fetcher,
            &ReachCount { target: 1 },
            PollSettings::from_millis(300, 1_000),
        )
        .await;

        match result {
            Err(PollError::Timeout { attempts, elapsed, .. }) => {
                assert_eq!(attempts, 1);
                assert_eq!(elapsed, Duration::from_millis(300));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_report_contains_last_snapshot() {
        let mut fetcher = ScriptedFetcher::new(vec![1, 2]);

        let error = poll_until(
            &mut fetcher,
            &ReachCount { target: 10 },
            PollSettings::from_millis(3_000, 1_000),
        )
        .await
        .unwrap_err();

        let report = error.report().unwrap();
        assert!(report.contains("Expected: 10"));
        assert!(report.contains("Found: Some(2)"));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_stops_without_retry() {
        let mut fetcher = ScriptedFetcher::new(vec![1, -1, 5]);

        let error = poll_until(
            &mut fetcher,
            &ReachCount { target: 5 },
            PollSettings::from_millis(10_000, 500),
        )
        .await
        .unwrap_err();

        match error {
            PollError::TerminalFailure { reason, attempts, .. } => {
                assert_eq!(reason, "negative: -1");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected terminal failure, got {other:?}"),
        }
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_errors_are_retried() {
        let mut fetcher =
            ScriptedFetcher::with_script(vec![Err(not_yet_there()), Err(not_yet_there())], 7);

        let polled = poll_until(
            &mut fetcher,
            &ReachCount { target: 7 },
            PollSettings::from_millis(5_000, 300),
        )
        .await
        .unwrap();

        assert_eq!(polled.snapshot, 7);
        assert_eq!(polled.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_transient_errors_time_out_with_last_error() {
        let script = (0..10).map(|_| Err(not_yet_there())).collect();
        let mut fetcher = ScriptedFetcher::with_script(script, 0);

        let error = poll_until(
            &mut fetcher,
            &ReachCount { target: 1 },
            PollSettings::from_millis(1_000, 300),
        )
        .await
        .unwrap_err();

        let report = error.report().unwrap();
        assert!(report.contains("Last fetch error"));
        assert!(report.contains("null"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_fetch_error_aborts() {
        let fatal = SecHubError::InvalidResponse {
            status: 401,
            message: "bad credentials".to_string(),
        };
        let mut fetcher = ScriptedFetcher::with_script(vec![Err(fatal)], 1);

        let error = poll_until(
            &mut fetcher,
            &ReachCount { target: 1 },
            PollSettings::from_millis(5_000, 300),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, PollError::Fetch(_)));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescent_succeeds_only_after_full_timeout() {
        let mut fetcher = ScriptedFetcher::new(vec![0]);
        let start = Instant::now();

        let polled = poll_until(&mut fetcher, &StaysZero, PollSettings::from_millis(2_000, 500))
            .await
            .unwrap();

        assert_eq!(polled.snapshot, 0);
        assert_eq!(start.elapsed(), Duration::from_millis(2_000));
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescent_fails_on_single_change() {
        let mut fetcher = ScriptedFetcher::new(vec![0, 0, 1, 0]);

        let error = poll_until(&mut fetcher, &StaysZero, PollSettings::from_millis(5_000, 500))
            .await
            .unwrap_err();

        assert!(matches!(error, PollError::TerminalFailure { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescent_with_unreachable_server_times_out() {
        let unavailable = || SecHubError::InvalidResponse {
            status: 503,
            message: "service unavailable".to_string(),
        };
        let mut script = vec![Ok(0)];
        script.extend((0..20).map(|_| Err(unavailable())));
        let mut fetcher = ScriptedFetcher::with_script(script, 0);

        let error = poll_until(&mut fetcher, &StaysZero, PollSettings::from_millis(5_000, 1_000))
            .await
            .unwrap_err();

        match error {
            PollError::Timeout { attempts, report, .. } => {
                assert_eq!(attempts, 5);
                assert!(report.contains("Last fetch error"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescent_with_one_missed_attempt_times_out() {
        let lost = SecHubError::InvalidResponse {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let mut fetcher = ScriptedFetcher::with_script(vec![Ok(0), Err(lost), Ok(0)], 0);

        let result =
            poll_until(&mut fetcher, &StaysZero, PollSettings::from_millis(3_000, 500)).await;

        assert!(matches!(result, Err(PollError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_is_cut_off_at_deadline() {
        let mut fetcher = from_fn(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<i64, SecHubError>(1)
        });
        let start = Instant::now();

        let error = poll_until(
            &mut fetcher,
            &ReachCount { target: 1 },
            PollSettings::from_millis(300, 100),
        )
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_millis(300));
        match error {
            PollError::Timeout { attempts, report, .. } => {
                assert_eq!(attempts, 1);
                assert!(report.contains("Request timed out"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_fetcher() {
        let mut counter = 0i64;
        let mut fetcher = from_fn(move || {
            counter += 1;
            std::future::ready(Ok::<i64, SecHubError>(counter))
        });

        let polled = poll_until(
            &mut fetcher,
            &ReachCount { target: 4 },
            PollSettings::from_millis(10_000, 100),
        )
        .await
        .unwrap();

        assert_eq!(polled.snapshot, 4);
    }

    #[test]
    fn test_with_appended_report() {
        let error = PollError::Timeout {
            elapsed: Duration::from_secs(1),
            attempts: 1,
            report: "base".to_string(),
        }
        .with_appended_report("\nextra");

        assert_eq!(error.report(), Some("base\nextra"));
        assert!(
            PollError::Precondition("x".to_string())
                .with_appended_report("y")
                .report()
                .is_none()
        );
    }
}
