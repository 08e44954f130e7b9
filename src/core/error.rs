//! Error taxonomy for the training scheduler
//!
//! Every failure here is recoverable: creation-time errors are reported back
//! to the requester, dispatch-time errors leave the training incomplete so
//! the next sweep retries it.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures while resolving a time expression into an absolute instant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    /// The expression could not be parsed in the requested timezone.
    #[error("could not understand time expression `{0}`")]
    InvalidTime(String),

    /// The expression parsed fine but points into the past.
    #[error("resolved time {0} is already in the past")]
    PastTime(DateTime<Utc>),
}

/// Persistence failures from the training store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlite::Error),

    /// A stored timestamp did not round-trip through RFC 3339.
    #[error("malformed stored timestamp: {0}")]
    BadTimestamp(#[from] chrono::ParseError),
}

/// Failures from the chat transport while dispatching a notification.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel {0} is unavailable")]
    ChannelUnavailable(String),

    #[error("could not resolve a mention for user {0}")]
    MentionResolutionFailed(String),

    #[error("failed to send message to channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },
}

/// Anything that can go wrong while dispatching a single training.
///
/// The dispatcher never treats these as fatal: the training stays
/// `completed = false` and a later sweep picks it up again.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
