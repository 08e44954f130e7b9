//! # Trainings Feature
//!
//! One-shot training session reminders: time resolution, dedup queueing,
//! hourly reconciliation sweeps, and exactly-once notification dispatch.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod dispatch;
pub mod queue;
pub mod scheduler;
pub mod time;

pub use dispatch::Dispatcher;
pub use queue::TrainingQueue;
pub use scheduler::TrainingScheduler;
