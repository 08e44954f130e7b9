//! In-memory dedup queue for armed trainings
//!
//! Process-local set of training ids that currently own a pending timer.
//! Membership only exists between "armed" and "dispatch finished or process
//! restart"; after a restart the startup sweep rebuilds correctness from the
//! database, never from this set.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use dashmap::DashSet;

/// Set of training ids with an outstanding armed timer.
#[derive(Debug, Default)]
pub struct TrainingQueue {
    armed: DashSet<i64>,
}

impl TrainingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically arm a training. Returns `true` if it was newly armed,
    /// `false` if a timer is already pending - callers must not start a
    /// second timer in that case.
    pub fn try_arm(&self, id: i64) -> bool {
        self.armed.insert(id)
    }

    /// Drop a training from the queue once its dispatch attempt finished,
    /// regardless of outcome. A failed dispatch is rediscovered by the next
    /// sweep through the database, not through this set.
    pub fn disarm(&self, id: i64) {
        self.armed.remove(&id);
    }

    pub fn is_armed(&self, id: i64) -> bool {
        self.armed.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
