use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::time::Instant,
};

use crate::{
    SharedCache,
    error::{Error, Result},
};

const CLEANUP_EVERY_OPS: u64 = 1024;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Hash(_) => "hash",
            Self::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> Error {
    Error::WrongType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Process-local [`SharedCache`].
///
/// Expired keys are dropped lazily on access and swept every
/// `CLEANUP_EVERY_OPS` operations. Each operation holds the shard lock for
/// its key only, which makes the hash increment and list push atomic.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    slots: Arc<DashMap<String, Slot>>,
    ops_seen: Arc<AtomicU64>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.slots
            .iter()
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.key().clone())
            .collect()
    }

    fn tick(&self, key: &str) -> Instant {
        let now = Instant::now();
        let seen = self.ops_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen.is_multiple_of(CLEANUP_EVERY_OPS) {
            self.slots.retain(|_, slot| slot.is_live(now));
        } else {
            self.slots.remove_if(key, |_, slot| !slot.is_live(now));
        }
        now
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.tick(key);
        let Some(slot) = self.slots.get(key) else {
            return Ok(None);
        };
        match &slot.value {
            Value::Str(s) => Ok(Some(s.clone())),
            other => Err(wrong_type(key, "string", other)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = self.tick(key);
        self.slots.insert(
            key.to_string(),
            Slot::new(Value::Str(value.to_string()), ttl, now),
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.tick(key);
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Value::Str(value.to_string()), Some(ttl), now));
                Ok(true)
            },
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|key| self.slots.remove(key))
            .filter(|(_, slot)| slot.is_live(now))
            .count())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.tick(key);
        let Some(slot) = self.slots.get(key) else {
            return Ok(None);
        };
        match &slot.value {
            Value::Hash(map) => Ok(map.get(field).cloned()),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hset(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<()> {
        let now = self.tick(key);
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Value::Hash(HashMap::new()), None, now));
        match &mut slot.value {
            Value::Hash(map) => map.extend(fields.iter().cloned()),
            other => return Err(wrong_type(key, "hash", other)),
        }
        if let Some(ttl) = ttl {
            slot.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.tick(key);
        let Some(slot) = self.slots.get(key) else {
            return Ok(HashMap::new());
        };
        match &slot.value {
            Value::Hash(map) => Ok(map.clone()),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.tick(key);
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(false);
        };
        match &mut slot.value {
            Value::Hash(map) => Ok(map.remove(field).is_some()),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hincr(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64> {
        let now = self.tick(key);
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Value::Hash(HashMap::new()), None, now));
        let next = match &mut slot.value {
            Value::Hash(map) => {
                let current = match map.get(field) {
                    Some(raw) => raw.parse::<i64>().map_err(|_| Error::NotAnInteger {
                        key: key.to_string(),
                        field: field.to_string(),
                    })?,
                    None => 0,
                };
                let next = current.saturating_add(delta);
                map.insert(field.to_string(), next.to_string());
                next
            },
            other => return Err(wrong_type(key, "hash", other)),
        };
        if let Some(ttl) = ttl {
            slot.expires_at = Some(now + ttl);
        }
        Ok(next)
    }

    async fn push_recent(
        &self,
        key: &str,
        value: &str,
        keep: usize,
        ttl: Duration,
    ) -> Result<Vec<String>> {
        let now = self.tick(key);
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Value::List(VecDeque::new()), None, now));
        let recent = match &mut slot.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                list.truncate(keep);
                list.iter().cloned().collect()
            },
            other => return Err(wrong_type(key, "list", other)),
        };
        slot.expires_at = Some(now + ttl);
        Ok(recent)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.tick(key);
        Ok(match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(now + ttl);
                true
            },
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.tick(key);
        Ok(self
            .slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn string_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_nx_only_first_wins_until_expiry() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert!(cache.set_nx("deleteInProgress:1", "a", ttl).await.unwrap());
        assert!(!cache.set_nx("deleteInProgress:1", "b", ttl).await.unwrap());
        assert_eq!(
            cache.get("deleteInProgress:1").await.unwrap().as_deref(),
            Some("a")
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.set_nx("deleteInProgress:1", "c", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn hash_fields_round_trip() {
        let cache = InMemoryCache::new();
        cache
            .hset("h", &fields(&[("a", "1"), ("b", "2")]), None)
            .await
            .unwrap();
        cache.hset("h", &fields(&[("b", "3")]), None).await.unwrap();

        assert_eq!(cache.hget("h", "b").await.unwrap().as_deref(), Some("3"));
        assert_eq!(cache.hgetall("h").await.unwrap().len(), 2);
        assert!(cache.hdel("h", "a").await.unwrap());
        assert!(!cache.hdel("h", "a").await.unwrap());
        assert!(cache.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hincr_refreshes_expiry() {
        let cache = InMemoryCache::new();
        let decay = Some(Duration::from_secs(60));
        assert_eq!(cache.hincr("s", "strikes", 1, decay).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.hincr("s", "strikes", 1, decay).await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.hget("s", "strikes").await.unwrap().as_deref(), Some("2"));

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(cache.hincr("s", "strikes", 1, decay).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hincr_rejects_non_integer_field() {
        let cache = InMemoryCache::new();
        cache.hset("h", &fields(&[("n", "x")]), None).await.unwrap();
        let err = cache.hincr("h", "n", 1, None).await.unwrap_err();
        assert!(matches!(err, Error::NotAnInteger { .. }));
    }

    #[tokio::test]
    async fn hincr_is_atomic_under_contention() {
        let cache = InMemoryCache::new();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    cache.hincr("c", "n", 1, None).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.hget("c", "n").await.unwrap().as_deref(), Some("800"));
    }

    #[tokio::test(start_paused = true)]
    async fn push_recent_keeps_newest_first() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(5);
        for ts in ["1", "2", "3", "4"] {
            cache.push_recent("l", ts, 3, ttl).await.unwrap();
        }
        let recent = cache.push_recent("l", "5", 3, ttl).await.unwrap();
        assert_eq!(recent, vec!["5", "4", "3"]);

        tokio::time::advance(Duration::from_secs(6)).await;
        let recent = cache.push_recent("l", "6", 3, ttl).await.unwrap();
        assert_eq!(recent, vec!["6"]);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let cache = InMemoryCache::new();
        cache.set("s", "v", None).await.unwrap();
        let err = cache.hget("s", "f").await.unwrap_err();
        assert!(matches!(
            err,
            Error::WrongType {
                expected: "hash",
                found: "string",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_counts_live_keys_only() {
        let cache = InMemoryCache::new();
        cache.set("a", "1", None).await.unwrap();
        cache
            .set("b", "2", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let removed = cache
            .delete(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_and_ttl() {
        let cache = InMemoryCache::new();
        assert!(!cache.expire("k", Duration::from_secs(1)).await.unwrap());
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.ttl("k").await.unwrap(), None);

        assert!(cache.expire("k", Duration::from_secs(30)).await.unwrap());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.ttl("k").await.unwrap(), Some(Duration::from_secs(20)));
    }
}
