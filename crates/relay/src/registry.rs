//! Cache-backed directory of hub connections.
//!
//! The store is the authority. The cache keeps, per hub, a hash of channel id
//! to connection JSON (`hub:{id}:connections`) plus a `connection:{channel}`
//! pointer to the hub. A hub hash is only trusted when it carries the
//! [`LOADED_FIELD`] marker, which is written together with a full store read,
//! so a hash recreated by a single write-through never masquerades as the
//! whole hub.

use std::{sync::Arc, time::Duration};

use {
    hublink_cache::{SharedCache, keys},
    hublink_common::types::Connection,
    hublink_store::Store,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, registry as registry_metrics};

use crate::error::Result;

const LOADED_FIELD: &str = "__loaded";

pub struct ConnectionRegistry {
    store: Arc<dyn Store>,
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
}

fn degraded(op: &'static str, err: &hublink_cache::Error) {
    warn!(op, error = %err, "connection cache unavailable, reading from store");
    #[cfg(feature = "metrics")]
    counter!(registry_metrics::CACHE_DEGRADED_TOTAL, "op" => op).increment(1);
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Connection for a channel, connected or not.
    pub async fn resolve(&self, channel_id: &str) -> Result<Option<Connection>> {
        match self.cached(channel_id).await {
            Ok(Some(conn)) => {
                #[cfg(feature = "metrics")]
                counter!(registry_metrics::CACHE_HITS_TOTAL).increment(1);
                return Ok(Some(conn));
            },
            Ok(None) => {
                #[cfg(feature = "metrics")]
                counter!(registry_metrics::CACHE_MISSES_TOTAL).increment(1);
            },
            Err(e) => degraded("resolve", &e),
        }

        let Some(conn) = self.store.get_connection(channel_id).await? else {
            return Ok(None);
        };
        if let Err(e) = self.load_hub(&conn.hub_id).await {
            degraded("resolve", &e);
        }
        Ok(Some(conn))
    }

    /// Connected channels of a hub, ordered by channel id.
    pub async fn list_connected(&self, hub_id: &str) -> Result<Vec<Connection>> {
        let mut all = match self.cached_hub(hub_id).await {
            Ok(Some(all)) => all,
            Ok(None) => {
                #[cfg(feature = "metrics")]
                counter!(registry_metrics::CACHE_MISSES_TOTAL).increment(1);
                let all = self.store.list_connections(hub_id).await?;
                if let Err(e) = self.populate(hub_id, &all).await {
                    degraded("list_connected", &e);
                }
                all
            },
            Err(e) => {
                degraded("list_connected", &e);
                self.store.list_connections(hub_id).await?
            },
        };
        all.retain(|c| c.connected);
        all.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(all)
    }

    /// Insert or replace a connection. Store first, then cache.
    pub async fn upsert(&self, conn: &Connection) -> Result<()> {
        self.store.upsert_connection(conn).await?;
        if let Err(e) = self.write_through(conn).await {
            warn!(channel_id = %conn.channel_id, error = %e, "connection cache write failed");
            self.invalidate_channel(&conn.channel_id, Some(&conn.hub_id)).await;
        }
        Ok(())
    }

    /// Remove a connection everywhere, typically after its webhook failed
    /// permanently.
    pub async fn disable(&self, channel_id: &str) -> Result<bool> {
        let existing = self.store.get_connection(channel_id).await?;
        let removed = self.store.delete_connection(channel_id).await?;
        self.invalidate_channel(channel_id, existing.as_ref().map(|c| c.hub_id.as_str()))
            .await;
        debug!(channel_id, removed, "connection disabled");
        Ok(removed)
    }

    /// Pause or resume a connection.
    pub async fn set_connected(&self, channel_id: &str, connected: bool) -> Result<bool> {
        if !self.store.set_connected(channel_id, connected).await? {
            return Ok(false);
        }
        if let Some(conn) = self.store.get_connection(channel_id).await?
            && let Err(e) = self.write_through(&conn).await
        {
            warn!(channel_id, error = %e, "connection cache write failed");
            self.invalidate_channel(channel_id, Some(&conn.hub_id)).await;
        }
        Ok(true)
    }

    /// Record activity on a channel.
    pub async fn touch(&self, channel_id: &str, at_ms: i64) -> Result<()> {
        self.store.touch_connection(channel_id, at_ms).await?;
        match self.cached(channel_id).await {
            Ok(Some(mut conn)) => {
                conn.last_active_at = at_ms;
                if let Err(e) = self.write_through(&conn).await {
                    warn!(channel_id, error = %e, "connection cache write failed");
                }
            },
            Ok(None) => {},
            Err(e) => degraded("touch", &e),
        }
        Ok(())
    }

    /// Drop every cached entry of a hub.
    pub async fn forget_hub(&self, hub_id: &str) -> Result<()> {
        let key = keys::hub_connections(hub_id);
        let mut doomed: Vec<String> = self
            .cache
            .hgetall(&key)
            .await?
            .into_keys()
            .filter(|field| field != LOADED_FIELD)
            .map(|channel| keys::connection(&channel))
            .collect();
        doomed.push(key);
        self.cache.delete(&doomed).await?;
        Ok(())
    }

    async fn cached(&self, channel_id: &str) -> hublink_cache::Result<Option<Connection>> {
        let Some(hub_id) = self.cache.get(&keys::connection(channel_id)).await? else {
            return Ok(None);
        };
        let Some(raw) = self
            .cache
            .hget(&keys::hub_connections(&hub_id), channel_id)
            .await?
        else {
            return Ok(None);
        };
        Ok(decode(channel_id, &raw))
    }

    async fn cached_hub(&self, hub_id: &str) -> hublink_cache::Result<Option<Vec<Connection>>> {
        let fields = self.cache.hgetall(&keys::hub_connections(hub_id)).await?;
        if !fields.contains_key(LOADED_FIELD) {
            return Ok(None);
        }
        Ok(Some(
            fields
                .iter()
                .filter(|(field, _)| field.as_str() != LOADED_FIELD)
                .filter_map(|(channel, raw)| decode(channel, raw))
                .collect(),
        ))
    }

    async fn load_hub(&self, hub_id: &str) -> hublink_cache::Result<()> {
        match self.store.list_connections(hub_id).await {
            Ok(all) => self.populate(hub_id, &all).await,
            Err(e) => {
                warn!(hub_id, error = %e, "could not load hub connections for cache");
                Ok(())
            },
        }
    }

    async fn populate(&self, hub_id: &str, all: &[Connection]) -> hublink_cache::Result<()> {
        let mut fields = Vec::with_capacity(all.len() + 1);
        for conn in all {
            match serde_json::to_string(conn) {
                Ok(json) => fields.push((conn.channel_id.clone(), json)),
                Err(e) => warn!(channel_id = %conn.channel_id, error = %e, "unencodable connection"),
            }
        }
        fields.push((LOADED_FIELD.to_string(), "1".to_string()));
        self.cache
            .hset(&keys::hub_connections(hub_id), &fields, Some(self.ttl))
            .await?;
        for conn in all {
            self.cache
                .set(&keys::connection(&conn.channel_id), hub_id, Some(self.ttl))
                .await?;
        }
        Ok(())
    }

    async fn write_through(&self, conn: &Connection) -> Result<()> {
        let pointer = keys::connection(&conn.channel_id);
        if let Some(previous) = self.cache.get(&pointer).await?
            && previous != conn.hub_id
        {
            self.cache
                .hdel(&keys::hub_connections(&previous), &conn.channel_id)
                .await?;
        }
        let json = serde_json::to_string(conn)?;
        let hub_key = keys::hub_connections(&conn.hub_id);
        // Single-entry writes never extend the hub hash, only a full load does.
        self.cache
            .hset(&hub_key, &[(conn.channel_id.clone(), json)], None)
            .await?;
        if self.cache.ttl(&hub_key).await?.is_none() {
            self.cache.expire(&hub_key, self.ttl).await?;
        }
        self.cache.set(&pointer, &conn.hub_id, Some(self.ttl)).await?;
        Ok(())
    }

    async fn invalidate_channel(&self, channel_id: &str, hub_id: Option<&str>) {
        let pointer = keys::connection(channel_id);
        let hub_id = match hub_id {
            Some(h) => Some(h.to_string()),
            None => self.cache.get(&pointer).await.ok().flatten(),
        };
        if let Some(hub_id) = hub_id
            && let Err(e) = self
                .cache
                .hdel(&keys::hub_connections(&hub_id), channel_id)
                .await
        {
            warn!(channel_id, error = %e, "could not evict cached connection");
        }
        if let Err(e) = self.cache.delete(&[pointer]).await {
            warn!(channel_id, error = %e, "could not evict connection pointer");
        }
    }
}

fn decode(channel_id: &str, raw: &str) -> Option<Connection> {
    serde_json::from_str(raw)
        .inspect_err(|e| warn!(channel_id, error = %e, "ignoring undecodable cached connection"))
        .ok()
}
