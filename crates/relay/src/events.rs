//! Inbound events, decoupled from whichever gateway produced them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    /// Server nickname, shown instead of the username when the hub allows it.
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Bots and webhooks, relayed copies included, are never relayed.
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        if let Some(ct) = &self.content_type {
            return ct.starts_with("image/");
        }
        let name = self.filename.as_deref().unwrap_or(&self.url).to_ascii_lowercase();
        [".png", ".jpg", ".jpeg", ".gif", ".webp"]
            .iter()
            .any(|ext| name.ends_with(ext))
    }
}

/// The message being replied to, as seen by the platform in the source channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedMessage {
    /// Id in the source channel: a relayed copy or a native message.
    pub message_id: String,
    pub author_name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message_id: String,
    pub channel_id: String,
    pub server_id: String,
    pub server_name: String,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub referenced: Option<ReferencedMessage>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionAdded {
    /// Any copy, or the original.
    pub message_id: String,
    pub channel_id: String,
    pub server_id: String,
    pub user_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationRequested {
    /// Whichever copy the actor can see.
    pub message_id: String,
    pub actor_id: String,
    pub action: ModerationAction,
}

/// A button press. `custom_id` is `<action>:<args...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionInvoked {
    pub custom_id: String,
    pub message_id: String,
    pub channel_id: String,
    pub server_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    MessageCreated(MessageCreated),
    ReactionAdded(ReactionAdded),
    ModerationRequested(ModerationRequested),
    InteractionInvoked(InteractionInvoked),
}
