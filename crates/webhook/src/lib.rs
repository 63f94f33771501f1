//! Delivery of rendered messages to webhook endpoints.
//!
//! A destination channel is reached through an execute/edit/delete webhook.
//! [`WebhookSink`] is the seam the relay depends on; [`HttpWebhookSink`] talks
//! to a real endpoint with `reqwest`.

pub mod error;
pub mod http;
pub mod payload;

use async_trait::async_trait;

pub use {
    error::{DeliveryError, FailureClass, classify_status},
    http::HttpWebhookSink,
    payload::{ActionRow, AllowedMentions, Button, Embed, EmbedAuthor, EmbedFooter, EmbedImage, WebhookPayload},
};

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Receipt for a message created through a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Platform id of the created copy.
    pub message_id: String,
    pub timestamp: Option<String>,
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Post a new message and wait for its id.
    async fn execute(&self, webhook_url: &str, payload: &WebhookPayload) -> Result<DeliveryReceipt>;

    /// Replace content, embeds or components of a message the webhook created.
    async fn edit_message(
        &self,
        webhook_url: &str,
        message_id: &str,
        payload: &WebhookPayload,
    ) -> Result<()>;

    async fn delete_message(&self, webhook_url: &str, message_id: &str) -> Result<()>;
}
