//! # Features Layer
//!
//! Feature modules for the training bot. Currently the only feature is the
//! training scheduler itself.

pub mod trainings;

pub use trainings::{TrainingQueue, TrainingScheduler};
