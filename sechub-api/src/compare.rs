//! Structural comparison of recorded event inspections.
//!
//! Event delivery order across asynchronous consumers is not guaranteed, so
//! the comparison is position independent. It is *not* count independent:
//! every actual entry must consume exactly one equal expected entry.

use serde::Serialize;

use crate::events::Inspection;

/// Outcome of [`compare_inspections`]. Both lists are sorted, so the result
/// does not depend on the order of the compared entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ComparisonResult {
    /// Expected, but not found in the actual entries
    pub missing: Vec<Inspection>,
    /// Found, but not expected (or found more often than expected)
    pub unexpected: Vec<Inspection>,
}

/// Receiver level explanation for an unexpected entry that has a missing
/// counterpart with the same sender, event id and synchronicity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiverDifference {
    pub sender_class_name: String,
    pub event_id: String,
    pub synchronous: bool,
    /// Receivers found but not expected
    pub unexpected_receivers: Vec<String>,
    /// Receivers expected but not found
    pub missing_receivers: Vec<String>,
}

impl ComparisonResult {
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// Pair unexpected entries with missing entries of the same event and
    /// name the receivers that make them differ.
    #[must_use]
    pub fn receiver_differences(&self) -> Vec<ReceiverDifference> {
        let mut candidates: Vec<&Inspection> = self.missing.iter().collect();
        let mut differences = Vec::new();

        for found in &self.unexpected {
            let Some(position) = candidates.iter().position(|m| m.same_event(found)) else {
                continue;
            };
            let expected = candidates.remove(position);

            differences.push(ReceiverDifference {
                sender_class_name: found.sender_class_name.clone(),
                event_id: found.event_id.clone(),
                synchronous: found.synchronous,
                unexpected_receivers: found
                    .receiver_class_names
                    .difference(&expected.receiver_class_names)
                    .cloned()
                    .collect(),
                missing_receivers: expected
                    .receiver_class_names
                    .difference(&found.receiver_class_names)
                    .cloned()
                    .collect(),
            });
        }

        differences
    }
}

/// Compare expected against actual entries by full content equality
/// (sender, event id, synchronicity and exact receiver set).
///
/// Each actual entry is matched against a working copy of the expected
/// entries; a match consumes that expected entry. Actual entries without a
/// match are unexpected, expected entries left over are missing.
pub fn compare_inspections(expected: &[Inspection], actual: &[Inspection]) -> ComparisonResult {
    let mut unmatched: Vec<&Inspection> = expected.iter().collect();
    let mut unexpected = Vec::new();

    for entry in actual {
        match unmatched.iter().position(|candidate| *candidate == entry) {
            Some(index) => {
                unmatched.remove(index);
            }
            None => unexpected.push(entry.clone()),
        }
    }

    let mut missing: Vec<Inspection> = unmatched.into_iter().cloned().collect();
    missing.sort();
    unexpected.sort();

    ComparisonResult {
        missing,
        unexpected,
    }
}
