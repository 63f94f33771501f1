#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use {
    hublink_cache::InMemoryCache,
    hublink_common::types::{Connection, Hub},
    hublink_config::HublinkConfig,
    hublink_relay::{
        Author, MessageCreated, Relay, RelayOutcome, RelaySummary,
        testing::{self, RecordingHooks, RecordingSink},
    },
    hublink_store::{ConnectionStore, HubStore, SqliteStore},
};

pub const HUB: &str = "H";

pub fn connection(channel_id: &str) -> Connection {
    testing::connection(channel_id, HUB, &format!("server-{channel_id}"))
}

/// A relay over an in-memory store and cache with hub `H` connecting
/// the given channels.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<InMemoryCache>,
    pub sink: Arc<RecordingSink>,
    pub hooks: Arc<RecordingHooks>,
    pub relay: Relay,
    clock: AtomicI64,
}

impl Harness {
    pub async fn new(channels: &[&str]) -> Self {
        Self::with_config(&HublinkConfig::default(), channels).await
    }

    pub async fn with_config(config: &HublinkConfig, channels: &[&str]) -> Self {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.create_hub(&testing::hub(HUB)).await.unwrap();
        for channel in channels {
            store.upsert_connection(&connection(channel)).await.unwrap();
        }
        let cache = Arc::new(InMemoryCache::new());
        let sink = Arc::new(RecordingSink::default());
        let hooks = Arc::new(RecordingHooks::default());
        let relay = Relay::new(config, store.clone(), cache.clone(), sink.clone(), hooks.clone());
        Self {
            store,
            cache,
            sink,
            hooks,
            relay,
            clock: AtomicI64::new(1_700_000_000_000),
        }
    }

    /// A message from `user-{channel}`, timestamped well apart from the
    /// previous one so the spam window never fills by accident.
    pub fn message(&self, message_id: &str, channel_id: &str, content: &str) -> MessageCreated {
        MessageCreated {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
            server_id: format!("server-{channel_id}"),
            server_name: format!("Server {channel_id}"),
            author: Author {
                id: format!("user-{channel_id}"),
                username: format!("user-{channel_id}"),
                nickname: None,
                avatar_url: None,
                bot: false,
            },
            content: content.into(),
            attachments: Vec::new(),
            referenced: None,
            created_at: self.clock.fetch_add(60_000, Ordering::SeqCst),
        }
    }

    pub async fn post(&self, message_id: &str, channel_id: &str, content: &str) -> RelayOutcome {
        let msg = self.message(message_id, channel_id, content);
        self.relay.handle_message(&msg).await.unwrap()
    }

    pub async fn relayed(&self, message_id: &str, channel_id: &str, content: &str) -> RelaySummary {
        match self.post(message_id, channel_id, content).await {
            RelayOutcome::Relayed(summary) => summary,
            other => panic!("expected relay, got {other:?}"),
        }
    }

    pub async fn set_hub(&self, update: impl FnOnce(&mut Hub)) {
        let mut hub = self.store.get_hub(HUB).await.unwrap().unwrap();
        update(&mut hub);
        self.store.update_hub(&hub).await.unwrap();
    }
}
