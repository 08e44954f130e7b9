//! Sweep scheduler
//!
//! Reconciles durable state with in-process timers. A sweep lists every
//! incomplete training due before the start of the next full hour and arms
//! each one that is not already queued; one sweep runs at startup and one on
//! every hour boundary afterwards. Together with the dedup queue this gives
//! at-most-once arming no matter how often sweeps run or how many restarts
//! happened in between.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::core::StoreError;
use crate::database::{Database, Training};
use crate::features::trainings::dispatch::Dispatcher;
use crate::features::trainings::queue::TrainingQueue;
use crate::features::trainings::time::next_full_hour;
use crate::transport::Transport;

/// Owns the dedup queue and drives periodic reconciliation.
#[derive(Clone)]
pub struct TrainingScheduler {
    database: Database,
    queue: Arc<TrainingQueue>,
    dispatcher: Dispatcher,
}

impl TrainingScheduler {
    pub fn new(database: Database, transport: Arc<dyn Transport>) -> Self {
        let queue = Arc::new(TrainingQueue::new());
        let dispatcher = Dispatcher::new(database.clone(), queue.clone(), transport);
        TrainingScheduler {
            database,
            queue,
            dispatcher,
        }
    }

    /// Run forever: a startup sweep right away, then one sweep at every
    /// full-hour boundary. Store failures are logged and retried on the next
    /// tick; nothing here brings the process down.
    pub async fn run(&self) {
        info!("Training scheduler started, running startup sweep");
        if let Err(e) = self.sweep().await {
            error!("Startup sweep failed, waiting for next tick: {e}");
        }

        let until_boundary = (next_full_hour(Utc::now()) - Utc::now())
            .to_std()
            .unwrap_or_default();
        debug!("Next sweep in {}s", until_boundary.as_secs());
        tokio::time::sleep(until_boundary).await;

        let mut tick = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            // First tick completes immediately, i.e. on the hour boundary.
            tick.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Sweep failed, waiting for next tick: {e}");
            }
        }
    }

    /// One reconciliation pass. Returns how many trainings were newly armed.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let cutoff = next_full_hour(Utc::now());
        let due = self.database.list_incomplete_due_by(cutoff).await?;

        let mut armed = 0;
        for training in &due {
            if self.arm(training) {
                armed += 1;
            }
        }

        if armed > 0 {
            info!("Sweep armed {armed} training(s) due before {cutoff}");
        } else {
            debug!("Sweep found nothing new to arm before {cutoff}");
        }
        Ok(armed)
    }

    /// Arm a freshly created training right away when it is due before the
    /// next sweep would catch it. Returns whether a timer was started.
    pub fn schedule_if_due(&self, training: &Training) -> bool {
        if training.date < next_full_hour(Utc::now()) {
            debug!("Training {} starts within the current hour", training.id);
            self.arm(training)
        } else {
            false
        }
    }

    /// Put a training into the dedup queue and start its one-shot timer.
    /// A training already past due fires immediately instead of being
    /// skipped - catching up after downtime is expected behavior.
    fn arm(&self, training: &Training) -> bool {
        if !self.queue.try_arm(training.id) {
            return false;
        }

        let delay = (training.date - Utc::now()).to_std().unwrap_or_default();
        debug!(
            "Queueing training {} to fire in {}s",
            training.id,
            delay.as_secs()
        );

        let dispatcher = self.dispatcher.clone();
        let id = training.id;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = dispatcher.dispatch(id).await {
                warn!("Dispatch of training {id} failed, leaving it for the next sweep: {e}");
            }
        });
        true
    }

    pub fn queue(&self) -> &TrainingQueue {
        &self.queue
    }
}
