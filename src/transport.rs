//! Chat transport seam
//!
//! The scheduler core only needs two things from the chat layer: turning a
//! user id into a displayable mention and sending text to a channel. This
//! trait keeps the core testable without a live Discord gateway; the real
//! implementation wraps a serenity HTTP client.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use async_trait::async_trait;
use log::debug;
use serenity::http::Http;
use serenity::model::id::{ChannelId, UserId};
use serenity::prelude::Mentionable;
use std::sync::Arc;

use crate::core::TransportError;

/// Minimal contract the dispatcher has against the chat layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve a user id into a displayable mention token.
    async fn resolve_mention(&self, user_id: &str) -> Result<String, TransportError>;

    /// Send a text message to a channel. The channel must still exist;
    /// otherwise this fails with [`TransportError::ChannelUnavailable`].
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError>;
}

/// Discord-backed transport over the serenity HTTP API.
pub struct DiscordTransport {
    http: Arc<Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<Http>) -> Self {
        DiscordTransport { http }
    }

    fn parse_channel(channel: &str) -> Result<ChannelId, TransportError> {
        channel
            .parse::<u64>()
            .map(ChannelId)
            .map_err(|_| TransportError::ChannelUnavailable(channel.to_string()))
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn resolve_mention(&self, user_id: &str) -> Result<String, TransportError> {
        let id = user_id
            .parse::<u64>()
            .map_err(|_| TransportError::MentionResolutionFailed(user_id.to_string()))?;

        // Fetch the user rather than formatting the id blindly, so a deleted
        // account surfaces as a resolution failure.
        let user = UserId(id)
            .to_user(&self.http)
            .await
            .map_err(|_| TransportError::MentionResolutionFailed(user_id.to_string()))?;

        Ok(user.mention().to_string())
    }

    async fn send_message(&self, channel: &str, text: &str) -> Result<(), TransportError> {
        let channel_id = Self::parse_channel(channel)?;

        self.http
            .get_channel(channel_id.0)
            .await
            .map_err(|_| TransportError::ChannelUnavailable(channel.to_string()))?;

        debug!("Sending message to channel {channel}");

        channel_id
            .say(&self.http, text)
            .await
            .map_err(|e| TransportError::SendFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}
