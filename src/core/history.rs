//! Transition history tracking.
//!
//! Every committed transition is appended to the machine's log, giving an
//! ordered, timestamped account of where an entity has been. Records carry
//! qualified state names so a log can outlive the map that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single committed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Qualified name of the state transitioned from.
    pub from: String,
    /// Qualified name of the state transitioned to.
    pub to: String,
    /// Name of the transition that was taken.
    pub transition: String,
    /// When the transition was committed.
    pub timestamp: DateTime<Utc>,
}

/// Ordered log of committed transitions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
}

impl TransitionLog {
    pub fn new() -> Self {
        TransitionLog {
            records: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, record: TransitionRecord) {
        self.records.push(record);
    }

    /// All recorded transitions in commit order.
    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The sequence of qualified state names traversed: the first record's
    /// origin followed by each record's destination.
    pub fn path(&self) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(first) = self.records.first() {
            path.push(first.from.as_str());
        }
        for record in &self.records {
            path.push(record.to.as_str());
        }
        path
    }

    /// Elapsed time between the first and last recorded transition, or
    /// `None` if the log is empty.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.first()?, self.records.last()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }
}
