//! Calls back into the chat platform for things a webhook cannot do.

use {async_trait::async_trait, hublink_common::types::Hub, tracing::info};

use crate::error::Result;

/// What moderators are told when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratorAlert {
    pub hub_id: String,
    pub reason: String,
    pub author_id: String,
    pub server_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub excerpt: String,
}

#[async_trait]
pub trait PlatformHooks: Send + Sync {
    /// Tell an author why their message was not relayed.
    async fn notify_author(&self, channel_id: &str, user_id: &str, notice: &str) -> Result<()>;

    /// React to a message in its own channel, used to ack filtered messages.
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Remove a user's native reaction once it has been folded into the
    /// synced control.
    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()>;

    async fn is_nsfw(&self, image_url: &str) -> Result<bool>;

    /// Used when the hub has no alert webhook configured.
    async fn alert_moderators(&self, hub: &Hub, alert: &ModeratorAlert) -> Result<()>;
}

/// Hooks that only log, for running without a platform connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

#[async_trait]
impl PlatformHooks for LoggingHooks {
    async fn notify_author(&self, channel_id: &str, user_id: &str, notice: &str) -> Result<()> {
        info!(channel_id, user_id, notice, "author notice");
        Ok(())
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        info!(channel_id, message_id, emoji, "ack reaction");
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        info!(channel_id, message_id, user_id, emoji, "native reaction removed");
        Ok(())
    }

    async fn is_nsfw(&self, _image_url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn alert_moderators(&self, hub: &Hub, alert: &ModeratorAlert) -> Result<()> {
        info!(hub_id = %hub.id, reason = %alert.reason, author_id = %alert.author_id, "moderator alert");
        Ok(())
    }
}
