//! Reactions shared across every copy of a relayed message.
//!
//! Native reactions only live on one copy, so they are folded into a tally
//! on the original and rendered back onto every copy as a single button.

use std::sync::Arc;

use {
    hublink_common::types::{Hub, HubSettings, InfractionKind, InfractionTarget, now_ms},
    hublink_store::Store,
    hublink_webhook::{ActionRow, Button, WebhookPayload},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, labels, reactions as reaction_metrics};

use crate::{
    dispatch::{BatchSummary, BroadcastDispatcher},
    error::Result,
    events::ReactionAdded,
    index::{BroadcastCopy, MessageIndex, ReactionTally, ReactionUpdate, ReplyLink},
    platform::PlatformHooks,
};

/// Custom id prefix of the reaction button.
pub const REACT_PREFIX: &str = "react";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ReactionsDisabled,
    Blacklisted,
    TooManyKinds,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReactionsDisabled => "reactions_disabled",
            Self::Blacklisted => "blacklisted",
            Self::TooManyKinds => "too_many_kinds",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Synced {
        added: bool,
        edits: BatchSummary,
    },
    Rejected(Rejection),
    /// The message left the index or never was relayed.
    Unknown,
}

/// Most used emoji with its count, plus how many other kinds exist.
pub fn top_reaction(tally: &ReactionTally) -> Option<(&str, usize, usize)> {
    let (emoji, users) = tally
        .iter()
        .filter(|(_, users)| !users.is_empty())
        .max_by(|(ea, a), (eb, b)| a.len().cmp(&b.len()).then_with(|| eb.cmp(ea)))?;
    let others = tally.values().filter(|u| !u.is_empty()).count() - 1;
    Some((emoji.as_str(), users.len(), others))
}

/// Component rows for a copy: the reaction button, then the reply link.
pub fn copy_components(
    original_id: &str,
    tally: &ReactionTally,
    reply: Option<&ReplyLink>,
) -> Vec<ActionRow> {
    let mut buttons = Vec::new();
    if let Some((emoji, count, others)) = top_reaction(tally) {
        let mut label = format!("{emoji} {count}");
        if others > 0 {
            label.push_str(&format!(" +{others} more"));
        }
        buttons.push(Button::action(
            format!("{REACT_PREFIX}:{original_id}:{emoji}"),
            label,
        ));
    }
    if let Some(reply) = reply {
        buttons.push(Button::link(reply.url.clone(), reply.label.clone()));
    }
    if buttons.is_empty() {
        return Vec::new();
    }
    vec![ActionRow::new(buttons)]
}

pub struct ReactionSync {
    store: Arc<dyn Store>,
    index: Arc<MessageIndex>,
    dispatcher: Arc<BroadcastDispatcher>,
    hooks: Arc<dyn PlatformHooks>,
    max_kinds: usize,
}

impl ReactionSync {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<MessageIndex>,
        dispatcher: Arc<BroadcastDispatcher>,
        hooks: Arc<dyn PlatformHooks>,
        max_kinds: usize,
    ) -> Self {
        Self {
            store,
            index,
            dispatcher,
            hooks,
            max_kinds,
        }
    }

    /// A native reaction was added to a copy or the original.
    pub async fn handle_reaction(&self, event: &ReactionAdded) -> Result<ReactionOutcome> {
        let outcome = self
            .toggle(&event.message_id, &event.user_id, &event.server_id, &event.emoji)
            .await?;
        if outcome != ReactionOutcome::Unknown
            && let Err(e) = self
                .hooks
                .remove_reaction(&event.channel_id, &event.message_id, &event.user_id, &event.emoji)
                .await
        {
            warn!(message_id = %event.message_id, error = %e, "could not remove native reaction");
        }
        Ok(outcome)
    }

    /// Add or remove `user_id`'s `emoji` on the message behind `message_id`
    /// and push the new control to every copy.
    pub async fn toggle(
        &self,
        message_id: &str,
        user_id: &str,
        server_id: &str,
        emoji: &str,
    ) -> Result<ReactionOutcome> {
        let Some(original) = self.index.resolve(message_id).await? else {
            return Ok(ReactionOutcome::Unknown);
        };
        let Some(hub) = self.store.get_hub(&original.hub_id).await? else {
            return Ok(ReactionOutcome::Unknown);
        };
        if let Some(rejection) = self.rejection(&hub, user_id, server_id).await? {
            return Ok(rejected(rejection));
        }

        let (added, tally) = match self
            .index
            .update_reactions(&original.message_id, emoji, user_id, self.max_kinds)
            .await?
        {
            ReactionUpdate::Applied { added, tally } => (added, tally),
            ReactionUpdate::TooManyKinds => return Ok(rejected(Rejection::TooManyKinds)),
            ReactionUpdate::Expired => return Ok(ReactionOutcome::Unknown),
        };
        #[cfg(feature = "metrics")]
        counter!(reaction_metrics::TOGGLES_TOTAL).increment(1);

        let copies: Vec<BroadcastCopy> = self
            .index
            .get_copies(&original.message_id, &original.hub_id)
            .await?
            .into_values()
            .collect();
        let edits = self
            .dispatcher
            .edit_copies(&copies, |copy| {
                WebhookPayload::components_only(copy_components(
                    &copy.original_id,
                    &tally,
                    copy.reply.as_ref(),
                ))
            })
            .await;
        debug!(
            message_id = %original.message_id,
            emoji,
            added,
            edited = edits.succeeded,
            copies = edits.attempted,
            "reactions synced"
        );
        Ok(ReactionOutcome::Synced { added, edits })
    }

    async fn rejection(&self, hub: &Hub, user_id: &str, server_id: &str) -> Result<Option<Rejection>> {
        if !hub.settings.contains(HubSettings::REACTIONS) {
            return Ok(Some(Rejection::ReactionsDisabled));
        }
        let now = now_ms();
        for target in [
            InfractionTarget::User(user_id.to_string()),
            InfractionTarget::Server(server_id.to_string()),
        ] {
            if self
                .store
                .find_active(&hub.id, &target, InfractionKind::Blacklist, now)
                .await?
                .is_some()
            {
                return Ok(Some(Rejection::Blacklisted));
            }
        }
        Ok(None)
    }
}

fn rejected(rejection: Rejection) -> ReactionOutcome {
    #[cfg(feature = "metrics")]
    counter!(reaction_metrics::REJECTED_TOTAL, labels::REASON => rejection.as_str()).increment(1);
    ReactionOutcome::Rejected(rejection)
}
