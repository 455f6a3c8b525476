//! Scripted snapshot fetchers for unit tests.

use std::collections::VecDeque;
use std::future::Future;

use crate::SecHubError;
use crate::poll::SnapshotFetcher;

/// Plays back a fixed script of fetch results, then keeps returning the
/// fallback snapshot forever.
pub struct ScriptedFetcher<S> {
    script: VecDeque<Result<S, SecHubError>>,
    fallback: S,
    calls: u32,
}

impl<S: Clone> ScriptedFetcher<S> {
    /// Script of snapshots; the last one repeats once the script is used up.
    pub fn new(snapshots: Vec<S>) -> Self {
        let fallback = snapshots
            .last()
            .cloned()
            .expect("scripted fetcher needs at least one snapshot");
        Self {
            script: snapshots.into_iter().map(Ok).collect(),
            fallback,
            calls: 0,
        }
    }

    pub fn with_script(script: Vec<Result<S, SecHubError>>, fallback: S) -> Self {
        Self {
            script: script.into(),
            fallback,
            calls: 0,
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}

impl<S: Clone> SnapshotFetcher<S> for ScriptedFetcher<S> {
    fn fetch(&mut self) -> impl Future<Output = Result<S, SecHubError>> {
        self.calls += 1;
        let next = self
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        std::future::ready(next)
    }
}
