//! Failure reports for wait calls.
//!
//! Every report contains the expectation, what was found, elapsed time, the
//! number of attempts and the last snapshot serialized as pretty JSON, so a
//! failing test can be understood without re-running it.

use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

use crate::compare::ComparisonResult;
use crate::events::EventHistory;

/// Build a human readable failure report.
pub fn describe<S: Serialize + ?Sized>(
    headline: &str,
    expectation_summary: &str,
    last_snapshot: Option<&S>,
    elapsed: Duration,
    attempts: u32,
    proposal: Option<&str>,
) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "{headline}");
    let _ = writeln!(
        report,
        "Elapsed: {} ms, attempts: {attempts}",
        elapsed.as_millis()
    );
    report.push_str(expectation_summary);
    if !expectation_summary.ends_with('\n') {
        report.push('\n');
    }
    report.push_str("Latest fetched snapshot was:\n");
    report.push_str(&pretty_json(last_snapshot));
    report.push('\n');

    if let Some(proposal) = proposal {
        report.push_str(
            "\nIf this is not a failure but correct and you are just writing or fixing the test, \
             you can paste the following expectation:\n\n",
        );
        report.push_str(proposal);
        if !proposal.ends_with('\n') {
            report.push('\n');
        }
    }

    report
}

/// Pretty printed JSON of a snapshot, `null` when there is none.
pub fn pretty_json<S: Serialize + ?Sized>(snapshot: Option<&S>) -> String {
    match snapshot {
        None => "null".to_string(),
        Some(snapshot) => serde_json::to_string_pretty(snapshot)
            .unwrap_or_else(|e| format!("<snapshot not serializable: {e}>")),
    }
}

/// Itemised listing of a structural mismatch.
pub fn describe_mismatch(result: &ComparisonResult) -> String {
    let mut report = String::new();

    if !result.unexpected.is_empty() {
        report.push_str("Found in history, but not expected:\n");
        for inspection in &result.unexpected {
            let _ = writeln!(report, " - {inspection}");
        }
    }
    if !result.missing.is_empty() {
        report.push_str("Expected, but missing in history:\n");
        for inspection in &result.missing {
            let _ = writeln!(report, " - {inspection}");
        }
    }

    for difference in result.receiver_differences() {
        let _ = writeln!(
            report,
            "Receivers of {} from {}: unexpected {:?}, missing {:?}",
            difference.event_id,
            difference.sender_class_name,
            difference.unexpected_receivers,
            difference.missing_receivers
        );
    }

    report
}

/// Reconstruct an `EventExpectation` builder expression from a recorded
/// history. Output depends on the history only: inspections in id order,
/// receivers sorted.
pub fn proposal_snippet(history: &EventHistory) -> String {
    let mut snippet = String::from("EventExpectation::builder()\n");

    for (id, inspection) in &history.id_to_inspection {
        let kind = if inspection.synchronous {
            "sync_event"
        } else {
            "async_event"
        };
        let _ = writeln!(snippet, "    /* {id} */");
        let _ = writeln!(snippet, "    .{kind}({:?})", inspection.event_id);
        let _ = writeln!(snippet, "        .from({:?})", inspection.sender_class_name);

        if inspection.receiver_class_names.is_empty() {
            snippet.push_str("        .to(&[])\n");
        } else {
            snippet.push_str("        .to(&[\n");
            for receiver in &inspection.receiver_class_names {
                let _ = writeln!(snippet, "            {receiver:?},");
            }
            snippet.push_str("        ])\n");
        }
    }

    snippet.push_str("    .build()\n");
    snippet
}
