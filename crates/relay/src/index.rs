//! TTL-bounded index of relayed messages and their per-channel copies.
//!
//! Layout, every key sharing one TTL:
//! - `message:{id}` hash with the original's identifiers
//! - `reactions:{id}` hash with one `{emoji}\x1f{user}` field per reaction
//! - `broadcasts:{id}:{hubId}` hash of destination channel to copy JSON
//! - `messageReverse:{copyId}` pointer back to the original id
//! - `hub:{id}:messages` hash of original id to creation time, used to purge a
//!   hub and pruned past the TTL on every record
//!
//! A missing key means the message is no longer moderatable, never an error.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use {
    hublink_cache::{SharedCache, keys},
    hublink_common::types::DisplayMode,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, index as index_metrics};

use crate::error::Result;

/// Emoji to the users who reacted with it.
pub type ReactionTally = BTreeMap<String, BTreeSet<String>>;

/// The canonical relayed message, identifiers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalMessage {
    pub message_id: String,
    pub hub_id: String,
    pub author_id: String,
    pub server_id: String,
    pub channel_id: String,
    pub created_at: i64,
    pub referenced_message_id: Option<String>,
    pub reactions: ReactionTally,
}

/// Reply button rendered on a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyLink {
    pub url: String,
    pub label: String,
}

/// One delivered copy of an original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastCopy {
    pub message_id: String,
    /// Destination channel, which also locates the webhook through the
    /// connection registry.
    pub channel_id: String,
    pub original_id: String,
    pub display_mode: DisplayMode,
    /// Kept so edits can rebuild the copy's buttons unchanged.
    #[serde(default)]
    pub reply: Option<ReplyLink>,
}

/// Result of flipping one user's reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionUpdate {
    Applied { added: bool, tally: ReactionTally },
    /// Adding would exceed the distinct emoji cap.
    TooManyKinds,
    /// The original left the index.
    Expired,
}

pub struct MessageIndex {
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
}

const F_MESSAGE_ID: &str = "messageId";
const F_HUB_ID: &str = "hubId";
const F_AUTHOR_ID: &str = "authorId";
const F_SERVER_ID: &str = "serverId";
const F_CHANNEL_ID: &str = "channelId";
const F_CREATED_AT: &str = "createdAt";
const F_REFERENCED: &str = "referredMessageId";
const REACTION_SEP: char = '\u{1f}';

fn reaction_field(emoji: &str, user_id: &str) -> String {
    format!("{emoji}{REACTION_SEP}{user_id}")
}

fn miss() {
    #[cfg(feature = "metrics")]
    counter!(index_metrics::MISSES_TOTAL).increment(1);
}

impl MessageIndex {
    pub fn new(cache: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Store an original with the copies it produced.
    pub async fn record(&self, original: &OriginalMessage, copies: &[BroadcastCopy]) -> Result<()> {
        let ttl = Some(self.ttl);
        let id = &original.message_id;

        let mut fields = vec![
            (F_MESSAGE_ID.to_string(), id.clone()),
            (F_HUB_ID.to_string(), original.hub_id.clone()),
            (F_AUTHOR_ID.to_string(), original.author_id.clone()),
            (F_SERVER_ID.to_string(), original.server_id.clone()),
            (F_CHANNEL_ID.to_string(), original.channel_id.clone()),
            (F_CREATED_AT.to_string(), original.created_at.to_string()),
        ];
        if let Some(referenced) = &original.referenced_message_id {
            fields.push((F_REFERENCED.to_string(), referenced.clone()));
        }
        self.cache.hset(&keys::message(id), &fields, ttl).await?;

        let reactions: Vec<(String, String)> = original
            .reactions
            .iter()
            .flat_map(|(emoji, users)| {
                users
                    .iter()
                    .map(|user| (reaction_field(emoji, user), "1".to_string()))
            })
            .collect();
        if !reactions.is_empty() {
            self.cache
                .hset(&keys::reactions(id), &reactions, ttl)
                .await?;
        }

        let copy_fields = copies
            .iter()
            .map(|c| -> Result<(String, String)> {
                Ok((c.channel_id.clone(), serde_json::to_string(c)?))
            })
            .collect::<Result<Vec<_>>>()?;
        if !copy_fields.is_empty() {
            self.cache
                .hset(&keys::broadcasts(id, &original.hub_id), &copy_fields, ttl)
                .await?;
        }
        for copy in copies {
            self.cache
                .set(&keys::message_reverse(&copy.message_id), id, ttl)
                .await?;
        }
        self.track_in_hub(original).await?;

        #[cfg(feature = "metrics")]
        counter!(index_metrics::RECORDS_TOTAL).increment(1);
        debug!(message_id = %id, hub_id = %original.hub_id, copies = copies.len(), "indexed message");
        Ok(())
    }

    pub async fn get_original(&self, message_id: &str) -> Result<Option<OriginalMessage>> {
        let original = self.load(message_id).await?;
        if original.is_none() {
            miss();
        }
        Ok(original)
    }

    /// Copies keyed by destination channel.
    pub async fn get_copies(
        &self,
        message_id: &str,
        hub_id: &str,
    ) -> Result<BTreeMap<String, BroadcastCopy>> {
        let fields = self
            .cache
            .hgetall(&keys::broadcasts(message_id, hub_id))
            .await?;
        let mut copies = BTreeMap::new();
        for (channel_id, raw) in fields {
            copies.insert(channel_id, serde_json::from_str(&raw)?);
        }
        Ok(copies)
    }

    pub async fn find_original_by_copy(&self, copy_id: &str) -> Result<Option<OriginalMessage>> {
        let Some(original_id) = self.cache.get(&keys::message_reverse(copy_id)).await? else {
            miss();
            return Ok(None);
        };
        self.get_original(&original_id).await
    }

    /// Resolve an id that may be the original itself or any of its copies.
    pub async fn resolve(&self, any_id: &str) -> Result<Option<OriginalMessage>> {
        if let Some(original) = self.load(any_id).await? {
            return Ok(Some(original));
        }
        self.find_original_by_copy(any_id).await
    }

    /// Add `user_id`'s `emoji` to the tally, or remove it when already
    /// present, and return the tally afterwards.
    ///
    /// Each user's reaction is its own hash field, so concurrent toggles by
    /// different users never overwrite each other. The distinct emoji cap is
    /// checked before adding and may be overshot by racing additions.
    pub async fn update_reactions(
        &self,
        message_id: &str,
        emoji: &str,
        user_id: &str,
        max_kinds: usize,
    ) -> Result<ReactionUpdate> {
        let message_key = keys::message(message_id);
        if self.cache.hget(&message_key, F_MESSAGE_ID).await?.is_none() {
            miss();
            return Ok(ReactionUpdate::Expired);
        }

        let key = keys::reactions(message_id);
        let field = reaction_field(emoji, user_id);
        let added = if self.cache.hdel(&key, &field).await? {
            false
        } else {
            let tally = self.reactions(message_id).await?;
            if !tally.contains_key(emoji) && tally.len() >= max_kinds {
                return Ok(ReactionUpdate::TooManyKinds);
            }
            self.cache.hset(&key, &[(field, "1".to_string())], None).await?;
            if self.cache.ttl(&key).await?.is_none() {
                let left = self.cache.ttl(&message_key).await?.unwrap_or(self.ttl);
                self.cache.expire(&key, left).await?;
            }
            true
        };

        Ok(ReactionUpdate::Applied {
            added,
            tally: self.reactions(message_id).await?,
        })
    }

    async fn reactions(&self, message_id: &str) -> Result<ReactionTally> {
        let mut tally = ReactionTally::new();
        for field in self.cache.hgetall(&keys::reactions(message_id)).await?.into_keys() {
            if let Some((emoji, user)) = field.split_once(REACTION_SEP) {
                tally
                    .entry(emoji.to_string())
                    .or_default()
                    .insert(user.to_string());
            }
        }
        Ok(tally)
    }

    async fn load(&self, message_id: &str) -> Result<Option<OriginalMessage>> {
        let fields = self.cache.hgetall(&keys::message(message_id)).await?;
        let Some(mut original) = parse_original(&fields) else {
            return Ok(None);
        };
        original.reactions = self.reactions(message_id).await?;
        Ok(Some(original))
    }

    async fn track_in_hub(&self, original: &OriginalMessage) -> Result<()> {
        let key = keys::hub_messages(&original.hub_id);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let horizon = original.created_at.saturating_sub(ttl_ms);
        for (id, created_at) in self.cache.hgetall(&key).await? {
            if created_at.parse::<i64>().is_ok_and(|at| at < horizon) {
                self.cache.hdel(&key, &id).await?;
            }
        }
        self.cache
            .hset(
                &key,
                &[(original.message_id.clone(), original.created_at.to_string())],
                Some(self.ttl),
            )
            .await?;
        Ok(())
    }

    /// Drop every indexed message of a hub. Returns how many originals went.
    pub async fn purge_hub(&self, hub_id: &str) -> Result<usize> {
        let hub_key = keys::hub_messages(hub_id);
        let message_ids: Vec<String> = self.cache.hgetall(&hub_key).await?.into_keys().collect();

        let mut doomed = Vec::new();
        for id in &message_ids {
            for copy in self.get_copies(id, hub_id).await?.values() {
                doomed.push(keys::message_reverse(&copy.message_id));
            }
            doomed.push(keys::broadcasts(id, hub_id));
            doomed.push(keys::reactions(id));
            doomed.push(keys::message(id));
        }
        doomed.push(hub_key);
        self.cache.delete(&doomed).await?;
        debug!(hub_id, purged = message_ids.len(), "purged hub messages");
        Ok(message_ids.len())
    }
}

fn parse_original(fields: &HashMap<String, String>) -> Option<OriginalMessage> {
    let get = |name: &str| fields.get(name).cloned();
    Some(OriginalMessage {
        message_id: get(F_MESSAGE_ID)?,
        hub_id: get(F_HUB_ID)?,
        author_id: get(F_AUTHOR_ID)?,
        server_id: get(F_SERVER_ID)?,
        channel_id: get(F_CHANNEL_ID)?,
        created_at: fields.get(F_CREATED_AT)?.parse().ok()?,
        referenced_message_id: get(F_REFERENCED),
        reactions: ReactionTally::new(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hublink_cache::InMemoryCache};

    fn original(id: &str) -> OriginalMessage {
        OriginalMessage {
            message_id: id.into(),
            hub_id: "h1".into(),
            author_id: "u1".into(),
            server_id: "sA".into(),
            channel_id: "A".into(),
            created_at: 1_000,
            referenced_message_id: None,
            reactions: ReactionTally::new(),
        }
    }

    fn copy(original_id: &str, channel: &str) -> BroadcastCopy {
        BroadcastCopy {
            message_id: format!("{original_id}-{channel}"),
            channel_id: channel.into(),
            original_id: original_id.into(),
            display_mode: DisplayMode::Embed,
            reply: None,
        }
    }

    fn index() -> (Arc<InMemoryCache>, MessageIndex) {
        let cache = Arc::new(InMemoryCache::new());
        let index = MessageIndex::new(cache.clone(), Duration::from_secs(86_400));
        (cache, index)
    }

    #[tokio::test]
    async fn record_then_get_copies_returns_same_set() {
        let (_cache, index) = index();
        let copies = vec![copy("m1", "B"), copy("m1", "C")];
        index.record(&original("m1"), &copies).await.unwrap();

        let got = index.get_copies("m1", "h1").await.unwrap();
        assert_eq!(got.into_values().collect::<Vec<_>>(), copies);
    }

    #[tokio::test]
    async fn every_copy_resolves_to_the_original() {
        let (_cache, index) = index();
        let copies = vec![copy("m1", "B"), copy("m1", "C")];
        index.record(&original("m1"), &copies).await.unwrap();

        for c in &copies {
            let found = index.find_original_by_copy(&c.message_id).await.unwrap();
            assert_eq!(found, Some(original("m1")));
        }
        assert_eq!(index.resolve("m1").await.unwrap(), Some(original("m1")));
        assert_eq!(index.resolve("m1-B").await.unwrap(), Some(original("m1")));
        assert_eq!(index.resolve("nope").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_misses() {
        let (_cache, index) = index();
        index.record(&original("m1"), &[copy("m1", "B")]).await.unwrap();

        tokio::time::advance(Duration::from_secs(86_401)).await;
        assert!(index.get_original("m1").await.unwrap().is_none());
        assert!(index.find_original_by_copy("m1-B").await.unwrap().is_none());
        assert!(index.get_copies("m1", "h1").await.unwrap().is_empty());
        assert_eq!(
            index.update_reactions("m1", "👍", "u2", 10).await.unwrap(),
            ReactionUpdate::Expired
        );
    }

    #[tokio::test]
    async fn reactions_and_reference_survive_round_trip() {
        let (_cache, index) = index();
        let mut msg = original("m1");
        msg.referenced_message_id = Some("m0".into());
        index.record(&msg, &[]).await.unwrap();

        let update = index.update_reactions("m1", "👍", "u2", 10).await.unwrap();
        let ReactionUpdate::Applied { added: true, tally } = update else {
            panic!("unexpected {update:?}");
        };

        let got = index.get_original("m1").await.unwrap().unwrap();
        assert_eq!(got.referenced_message_id.as_deref(), Some("m0"));
        assert_eq!(got.reactions, tally);
        assert_eq!(index.resolve("m1").await.unwrap().unwrap().reactions, tally);
    }

    #[tokio::test]
    async fn second_toggle_removes_the_reaction() {
        let (_cache, index) = index();
        index.record(&original("m1"), &[]).await.unwrap();

        index.update_reactions("m1", "👍", "u2", 10).await.unwrap();
        let update = index.update_reactions("m1", "👍", "u2", 10).await.unwrap();
        assert_eq!(
            update,
            ReactionUpdate::Applied {
                added: false,
                tally: ReactionTally::new(),
            }
        );
    }

    #[tokio::test]
    async fn concurrent_reactions_are_all_kept() {
        let (_cache, index) = index();
        index.record(&original("m1"), &[]).await.unwrap();

        let (a, b) = tokio::join!(
            index.update_reactions("m1", "👍", "u1", 10),
            index.update_reactions("m1", "👍", "u2", 10),
        );
        assert!(matches!(a.unwrap(), ReactionUpdate::Applied { added: true, .. }));
        assert!(matches!(b.unwrap(), ReactionUpdate::Applied { added: true, .. }));

        let tally = index.get_original("m1").await.unwrap().unwrap().reactions;
        assert_eq!(tally.get("👍").map(BTreeSet::len), Some(2));
    }

    #[tokio::test]
    async fn kind_cap_only_blocks_new_emoji() {
        let (_cache, index) = index();
        index.record(&original("m1"), &[]).await.unwrap();
        index.update_reactions("m1", "👍", "u1", 1).await.unwrap();

        assert_eq!(
            index.update_reactions("m1", "🔥", "u2", 1).await.unwrap(),
            ReactionUpdate::TooManyKinds
        );
        assert!(matches!(
            index.update_reactions("m1", "👍", "u2", 1).await.unwrap(),
            ReactionUpdate::Applied { added: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reactions_expire_with_the_message() {
        let (cache, index) = index();
        index.record(&original("m1"), &[]).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_000)).await;
        index.update_reactions("m1", "👍", "u1", 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(401)).await;
        assert!(cache.hgetall(&keys::reactions("m1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hub_listing_drops_messages_older_than_the_ttl() {
        let (cache, index) = index();
        let hours = 3_600_000;
        for n in 0..10 {
            let mut msg = original(&format!("m{n}"));
            msg.created_at = n * 20 * hours;
            index.record(&msg, &[]).await.unwrap();
        }

        let mut tracked: Vec<String> = cache
            .hgetall(&keys::hub_messages("h1"))
            .await
            .unwrap()
            .into_keys()
            .collect();
        tracked.sort();
        assert_eq!(tracked, vec!["m8".to_string(), "m9".to_string()]);
    }

    #[tokio::test]
    async fn purge_hub_removes_all_keys() {
        let (cache, index) = index();
        index.record(&original("m1"), &[copy("m1", "B")]).await.unwrap();
        index.record(&original("m2"), &[copy("m2", "C")]).await.unwrap();

        assert_eq!(index.purge_hub("h1").await.unwrap(), 2);
        assert!(cache.keys().is_empty());
    }
}
