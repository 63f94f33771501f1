//! Fixtures shared by the unit and integration tests.
//!
//! Built for this crate's own tests and, behind the `test-util` feature, for
//! the integration tests under `tests/`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    hublink_cache::{Error as CacheError, Result as CacheResult, SharedCache},
    hublink_common::types::{Connection, DisplayMode, Hub, HubSettings},
    hublink_store::Store,
    hublink_webhook::{DeliveryError, DeliveryReceipt, WebhookPayload, WebhookSink},
    secrecy::Secret,
};

use crate::{
    error::Result,
    events::{Author, MessageCreated},
    platform::{ModeratorAlert, PlatformHooks},
};

pub fn hub(id: &str) -> Hub {
    Hub {
        id: id.into(),
        name: format!("Hub {id}"),
        owner_id: "owner".into(),
        private: false,
        locked: false,
        settings: HubSettings::default(),
        icon_url: None,
        alert_webhook: None,
        created_at: 0,
    }
}

pub async fn seed_hub(store: &dyn Store, id: &str) {
    store.create_hub(&hub(id)).await.unwrap();
}

/// Connection whose webhook URL ends in the channel id, which is how
/// [`RecordingSink`] tells destinations apart.
pub fn connection(channel_id: &str, hub_id: &str, server_id: &str) -> Connection {
    Connection {
        channel_id: channel_id.into(),
        hub_id: hub_id.into(),
        server_id: server_id.into(),
        webhook_url: Secret::new(format!("https://hooks.test/api/webhooks/{channel_id}")),
        connected: true,
        display_mode: DisplayMode::Embed,
        profanity_filter: false,
        last_active_at: 0,
        created_at: 0,
    }
}

/// Message from `user-{channel}` of `server-{channel}`.
pub fn message(message_id: &str, channel_id: &str, content: &str) -> MessageCreated {
    MessageCreated {
        message_id: message_id.into(),
        channel_id: channel_id.into(),
        server_id: format!("server-{channel_id}"),
        server_name: format!("Server {channel_id}"),
        author: Author {
            id: format!("user-{channel_id}"),
            username: format!("user-{channel_id}-name"),
            nickname: None,
            avatar_url: None,
            bot: false,
        },
        content: content.into(),
        attachments: Vec::new(),
        referenced: None,
        created_at: 0,
    }
}

/// Cache whose every call fails as if the server were down.
pub struct FailingCache;

fn down<T>() -> CacheResult<T> {
    Err(CacheError::unavailable("connection refused"))
}

#[async_trait]
impl SharedCache for FailingCache {
    async fn get(&self, _: &str) -> CacheResult<Option<String>> {
        down()
    }

    async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> CacheResult<()> {
        down()
    }

    async fn set_nx(&self, _: &str, _: &str, _: Duration) -> CacheResult<bool> {
        down()
    }

    async fn delete(&self, _: &[String]) -> CacheResult<usize> {
        down()
    }

    async fn hget(&self, _: &str, _: &str) -> CacheResult<Option<String>> {
        down()
    }

    async fn hset(&self, _: &str, _: &[(String, String)], _: Option<Duration>) -> CacheResult<()> {
        down()
    }

    async fn hgetall(&self, _: &str) -> CacheResult<HashMap<String, String>> {
        down()
    }

    async fn hdel(&self, _: &str, _: &str) -> CacheResult<bool> {
        down()
    }

    async fn hincr(&self, _: &str, _: &str, _: i64, _: Option<Duration>) -> CacheResult<i64> {
        down()
    }

    async fn push_recent(&self, _: &str, _: &str, _: usize, _: Duration) -> CacheResult<Vec<String>> {
        down()
    }

    async fn expire(&self, _: &str, _: Duration) -> CacheResult<bool> {
        down()
    }

    async fn ttl(&self, _: &str) -> CacheResult<Option<Duration>> {
        down()
    }
}

/// Webhook sink that records calls and fails or stalls chosen channels.
#[derive(Default)]
pub struct RecordingSink {
    seq: AtomicUsize,
    failures: Mutex<HashMap<String, DeliveryError>>,
    delays: Mutex<HashMap<String, Duration>>,
    executed: Mutex<Vec<(String, WebhookPayload)>>,
    edits: Mutex<Vec<(String, String, WebhookPayload)>>,
    deleted: Mutex<Vec<String>>,
}

fn channel_of(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().to_string()
}

impl RecordingSink {
    pub fn fail_channel(&self, channel_id: &str, error: DeliveryError) {
        self.failures.lock().unwrap().insert(channel_id.into(), error);
    }

    pub fn delay_channel(&self, channel_id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(channel_id.into(), delay);
    }

    /// Executed payloads by channel, in call order.
    pub fn executed(&self) -> Vec<(String, WebhookPayload)> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.executed().into_iter().map(|(c, _)| c).collect();
        channels.sort();
        channels
    }

    /// Last payload executed against `channel_id`.
    pub fn payload_for(&self, channel_id: &str) -> WebhookPayload {
        self.executed()
            .into_iter()
            .rev()
            .find(|(c, _)| c == channel_id)
            .map(|(_, p)| p)
            .unwrap()
    }

    /// `(channel, copy id, payload)` per edit, in call order.
    pub fn edits(&self) -> Vec<(String, String, WebhookPayload)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut ids = self.deleted.lock().unwrap().clone();
        ids.sort();
        ids
    }

    async fn gate(&self, url: &str) -> std::result::Result<String, DeliveryError> {
        let channel = channel_of(url);
        let delay = self.delays.lock().unwrap().get(&channel).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().unwrap().get(&channel) {
            return Err(err.clone());
        }
        Ok(channel)
    }
}

#[async_trait]
impl WebhookSink for RecordingSink {
    async fn execute(&self, url: &str, payload: &WebhookPayload) -> hublink_webhook::Result<DeliveryReceipt> {
        let channel = self.gate(url).await?;
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push((channel.clone(), payload.clone()));
        Ok(DeliveryReceipt {
            message_id: format!("copy-{channel}-{n}"),
            timestamp: None,
        })
    }

    async fn edit_message(
        &self,
        url: &str,
        message_id: &str,
        payload: &WebhookPayload,
    ) -> hublink_webhook::Result<()> {
        let channel = self.gate(url).await?;
        self.edits
            .lock()
            .unwrap()
            .push((channel, message_id.into(), payload.clone()));
        Ok(())
    }

    async fn delete_message(&self, url: &str, message_id: &str) -> hublink_webhook::Result<()> {
        self.gate(url).await?;
        self.deleted.lock().unwrap().push(message_id.into());
        Ok(())
    }
}

/// Platform hooks that record what they were asked to do.
#[derive(Default)]
pub struct RecordingHooks {
    nsfw: Mutex<HashSet<String>>,
    notices: Mutex<Vec<(String, String)>>,
    acks: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<(String, String)>>,
    alerts: Mutex<Vec<ModeratorAlert>>,
}

impl RecordingHooks {
    pub fn flag_nsfw(&self, url: &str) {
        self.nsfw.lock().unwrap().insert(url.into());
    }

    /// `(user, notice)` pairs.
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }

    /// `(message, emoji)` pairs added as acknowledgements.
    pub fn acks(&self) -> Vec<(String, String)> {
        self.acks.lock().unwrap().clone()
    }

    /// `(message, emoji)` pairs of removed native reactions.
    pub fn removed(&self) -> Vec<(String, String)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<ModeratorAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformHooks for RecordingHooks {
    async fn notify_author(&self, _: &str, user_id: &str, notice: &str) -> Result<()> {
        self.notices.lock().unwrap().push((user_id.into(), notice.into()));
        Ok(())
    }

    async fn add_reaction(&self, _: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.acks.lock().unwrap().push((message_id.into(), emoji.into()));
        Ok(())
    }

    async fn remove_reaction(&self, _: &str, message_id: &str, _: &str, emoji: &str) -> Result<()> {
        self.removed.lock().unwrap().push((message_id.into(), emoji.into()));
        Ok(())
    }

    async fn is_nsfw(&self, url: &str) -> Result<bool> {
        Ok(self.nsfw.lock().unwrap().contains(url))
    }

    async fn alert_moderators(&self, _: &Hub, alert: &ModeratorAlert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
