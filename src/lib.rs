// Core layer - shared configuration and error types
pub mod core;

// Features layer - the training scheduler
pub mod features;

// Infrastructure
pub mod database;
pub mod transport;

// Application layer
pub mod command_handler;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export the main feature items
pub use crate::command_handler::CommandHandler;
pub use crate::database::{Database, Training};
pub use crate::features::trainings::TrainingScheduler;
pub use crate::transport::{DiscordTransport, Transport};
