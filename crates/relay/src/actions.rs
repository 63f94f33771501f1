//! Moderation actions applied to every copy of a relayed message.

use std::{sync::Arc, time::Duration};

use {
    hublink_cache::{SharedCache, keys},
    hublink_config::StaffConfig,
    hublink_store::Store,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, moderation as moderation_metrics};

use crate::{
    dispatch::BroadcastDispatcher,
    error::Result,
    index::{BroadcastCopy, MessageIndex, OriginalMessage},
};

/// Custom id prefix of the moderator delete button.
pub const DELETE_PREFIX: &str = "delete";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { deleted: usize, total: usize },
    /// Expired from the index or never relayed.
    Unknown,
    Unauthorized,
    AlreadyInProgress,
}

pub struct CrossCopyModerationActions {
    store: Arc<dyn Store>,
    cache: Arc<dyn SharedCache>,
    index: Arc<MessageIndex>,
    dispatcher: Arc<BroadcastDispatcher>,
    staff: StaffConfig,
    marker_ttl: Duration,
}

impl CrossCopyModerationActions {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        index: Arc<MessageIndex>,
        dispatcher: Arc<BroadcastDispatcher>,
        staff: StaffConfig,
        marker_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            index,
            dispatcher,
            staff,
            marker_ttl,
        }
    }

    /// Whether `actor_id` may act on `original`: its author, the hub owner,
    /// a hub moderator, or platform staff.
    pub async fn authorized(&self, original: &OriginalMessage, actor_id: &str) -> Result<bool> {
        if original.author_id == actor_id || self.staff.is_staff(actor_id) {
            return Ok(true);
        }
        let Some(hub) = self.store.get_hub(&original.hub_id).await? else {
            return Ok(false);
        };
        if hub.owner_id == actor_id {
            return Ok(true);
        }
        Ok(self
            .store
            .moderator_role(&hub.id, actor_id)
            .await?
            .is_some())
    }

    /// Delete every copy of the message behind `message_id`, which may be
    /// the original or any copy.
    pub async fn delete_everywhere(&self, message_id: &str, actor_id: &str) -> Result<DeleteOutcome> {
        let Some(original) = self.index.resolve(message_id).await? else {
            return Ok(DeleteOutcome::Unknown);
        };
        if !self.authorized(&original, actor_id).await? {
            return Ok(DeleteOutcome::Unauthorized);
        }

        let marker = keys::delete_in_progress(&original.message_id);
        if !self.cache.set_nx(&marker, actor_id, self.marker_ttl).await? {
            return Ok(DeleteOutcome::AlreadyInProgress);
        }
        let result = self.delete_copies(&original).await;
        if let Err(e) = self.cache.delete(&[marker]).await {
            warn!(message_id = %original.message_id, error = %e, "could not release delete marker");
        }
        let (deleted, total) = result?;

        #[cfg(feature = "metrics")]
        counter!(moderation_metrics::COPIES_DELETED_TOTAL).increment(deleted as u64);
        info!(
            message_id = %original.message_id,
            hub_id = %original.hub_id,
            actor_id,
            deleted,
            total,
            "deleted relayed copies"
        );
        Ok(DeleteOutcome::Deleted { deleted, total })
    }

    async fn delete_copies(&self, original: &OriginalMessage) -> Result<(usize, usize)> {
        let copies: Vec<BroadcastCopy> = self
            .index
            .get_copies(&original.message_id, &original.hub_id)
            .await?
            .into_values()
            .collect();
        let summary = self.dispatcher.delete_copies(&copies).await;
        Ok((summary.succeeded, summary.attempted))
    }
}
