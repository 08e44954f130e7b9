//! Environment-driven bot configuration
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use anyhow::{Context, Result};

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token (required)
    pub bot_token: String,
    /// Path to the SQLite database file
    pub database_path: String,
    /// Prefix that marks a message as a command, e.g. `!`
    pub command_prefix: String,
    /// Default log level filter for env_logger
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `BOT_TOKEN` is required; everything else has a sensible default.
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("BOT_TOKEN")
            .context("BOT_TOKEN environment variable is required")?;

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "trainings.db".to_string());

        let command_prefix = std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            bot_token,
            database_path,
            command_prefix,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        std::env::set_var("BOT_TOKEN", "test-token");
        std::env::remove_var("DATABASE_PATH");
        std::env::remove_var("COMMAND_PREFIX");
        let config = Config::from_env().unwrap();
        assert_eq!(config.database_path, "trainings.db");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.log_level, "info");
    }
}
