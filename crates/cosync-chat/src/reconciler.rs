//! Folds streamed response increments into conversation snapshots

use std::sync::Arc;

use cosync_runtime::{Message, ResponseIncrement, collapse_adjacent_agent_state, to_app_messages};

use crate::store::Snapshot;

/// The result of folding one increment
#[derive(Debug, Clone)]
pub struct Merge {
    /// Baseline followed by everything accumulated so far
    pub snapshot: Snapshot,
    /// Messages produced by this increment alone
    pub chunk: Vec<Arc<Message>>,
}

/// Accumulates the messages of one completion on top of its baseline.
pub struct StreamReconciler {
    baseline: Snapshot,
    accumulated: Vec<Arc<Message>>,
}

impl StreamReconciler {
    /// Start folding on top of `baseline`
    pub fn new(baseline: Snapshot) -> Self {
        Self {
            baseline,
            accumulated: Vec::new(),
        }
    }

    /// Fold one increment. Returns `None` for increments without message
    /// payload, which leave the accumulator untouched.
    pub fn fold(&mut self, mut increment: ResponseIncrement) -> Option<Merge> {
        if !increment.has_payload() {
            tracing::trace!("Skipping keepalive increment");
            return None;
        }

        let fragments = collapse_adjacent_agent_state(increment.take_fragments());
        let chunk: Vec<Arc<Message>> = to_app_messages(fragments)
            .into_iter()
            .map(Arc::new)
            .collect();
        self.accumulated.extend(chunk.iter().cloned());

        let snapshot: Snapshot = self
            .baseline
            .iter()
            .chain(self.accumulated.iter())
            .cloned()
            .collect();
        Some(Merge { snapshot, chunk })
    }

    /// The snapshot this completion started from
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    /// Messages produced so far
    pub fn accumulated(&self) -> &[Arc<Message>] {
        &self.accumulated
    }

    /// Finish, returning the messages produced by the completion
    pub fn into_messages(self) -> Vec<Arc<Message>> {
        self.accumulated
    }
}
