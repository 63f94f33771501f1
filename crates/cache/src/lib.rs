//! Shared cache used for connection directories, the message index, anti-spam
//! windows and short-lived markers.
//!
//! [`SharedCache`] mirrors the subset of a Redis-style key space the relay
//! needs: string keys with TTL, hashes with atomic field increments, capped
//! recent-value lists and set-if-absent. [`InMemoryCache`] implements it for a
//! single process.

pub mod error;
pub mod memory;

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;

pub use {
    error::{Error, Result},
    memory::InMemoryCache,
};

/// Key-value store with TTL and atomic hash and list operations.
///
/// Expiry is per key, never per hash field. Operations on a key holding a
/// different kind of value fail with [`Error::WrongType`].
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite `key`. `None` keeps the value until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Store `value` only when `key` is absent. Returns whether it was stored.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remove keys of any kind. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Set hash fields, creating the hash if needed. A `ttl` resets the key expiry.
    async fn hset(&self, key: &str, fields: &[(String, String)], ttl: Option<Duration>)
    -> Result<()>;

    /// All fields of a hash; empty when the key is missing.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Remove one field. Returns whether it existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    /// Add `delta` to an integer field and return the new value. A `ttl`
    /// resets the key expiry in the same step.
    async fn hincr(&self, key: &str, field: &str, delta: i64, ttl: Option<Duration>)
    -> Result<i64>;

    /// Push `value` to the front of a list, trim it to `keep` entries, refresh
    /// the expiry, and return the list newest first.
    async fn push_recent(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        ttl: Duration,
    ) -> Result<Vec<String>>;

    /// Set a key's expiry. Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining lifetime, `None` for missing or persistent keys.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// Key layout shared by every process talking to the same cache.
pub mod keys {
    pub fn hub_connections(hub_id: &str) -> String {
        format!("hub:{hub_id}:connections")
    }

    pub fn connection(channel_id: &str) -> String {
        format!("connection:{channel_id}")
    }

    pub fn message(message_id: &str) -> String {
        format!("message:{message_id}")
    }

    pub fn message_reverse(copy_id: &str) -> String {
        format!("messageReverse:{copy_id}")
    }

    pub fn broadcasts(message_id: &str, hub_id: &str) -> String {
        format!("broadcasts:{message_id}:{hub_id}")
    }

    pub fn reactions(message_id: &str) -> String {
        format!("reactions:{message_id}")
    }

    pub fn hub_messages(hub_id: &str) -> String {
        format!("hub:{hub_id}:messages")
    }

    pub fn delete_in_progress(message_id: &str) -> String {
        format!("deleteInProgress:{message_id}")
    }

    pub fn spam_window(user_id: &str) -> String {
        format!("antispam:{user_id}:recent")
    }

    pub fn spam_strikes(user_id: &str) -> String {
        format!("antispam:{user_id}:strikes")
    }
}
