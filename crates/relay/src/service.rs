//! The relay service: gate, render, fan out, index.

use std::sync::Arc;

use {
    hublink_cache::SharedCache,
    hublink_common::types::{Hub, MessageAudit, now_ms},
    hublink_config::HublinkConfig,
    hublink_store::Store,
    hublink_webhook::WebhookSink,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, moderation as moderation_metrics, relay as relay_metrics};

use crate::{
    actions::{CrossCopyModerationActions, DeleteOutcome},
    dispatch::{BroadcastDispatcher, Delivery},
    error::Result,
    events::{InboundEvent, MessageCreated, ModerationAction},
    format::{MessageFormatter, RenderRequest, ReplyContext},
    index::{BroadcastCopy, MessageIndex, OriginalMessage},
    interactions::{InteractionReply, InteractionRouter, default_router},
    moderation::{EffectRunner, ModerationPipeline, Verdict},
    platform::PlatformHooks,
    reactions::{ReactionOutcome, ReactionSync},
    registry::ConnectionRegistry,
};

/// Delivery counts for a relayed message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub delivered: usize,
    pub failed: usize,
    pub disabled: usize,
    pub copies: Vec<BroadcastCopy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed(RelaySummary),
    Vetoed { gate: &'static str, reason: String },
    /// The source channel is not part of any hub.
    NotConnected,
    /// The source connection is paused.
    Paused,
    HubMissing,
    HubLocked,
    /// Bots and webhooks are never relayed.
    IgnoredBot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Message(RelayOutcome),
    Reaction(ReactionOutcome),
    Moderation(DeleteOutcome),
    Interaction(Option<InteractionReply>),
}

pub struct Relay {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
    index: Arc<MessageIndex>,
    pipeline: ModerationPipeline,
    formatter: MessageFormatter,
    dispatcher: Arc<BroadcastDispatcher>,
    reactions: Arc<ReactionSync>,
    actions: Arc<CrossCopyModerationActions>,
    interactions: InteractionRouter,
    effects: EffectRunner,
}

impl Relay {
    pub fn new(
        config: &HublinkConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        sink: Arc<dyn WebhookSink>,
        hooks: Arc<dyn PlatformHooks>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            store.clone(),
            cache.clone(),
            config.cache.connection_ttl(),
        ));
        let index = Arc::new(MessageIndex::new(cache.clone(), config.relay.message_ttl()));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            sink.clone(),
            registry.clone(),
            config.relay.fanout_concurrency,
            config.relay.delivery_timeout(),
        ));
        let reactions = Arc::new(ReactionSync::new(
            store.clone(),
            index.clone(),
            dispatcher.clone(),
            hooks.clone(),
            config.relay.max_reaction_kinds,
        ));
        let actions = Arc::new(CrossCopyModerationActions::new(
            store.clone(),
            cache.clone(),
            index.clone(),
            dispatcher.clone(),
            config.staff.clone(),
            config.relay.delete_marker_ttl(),
        ));
        Self {
            pipeline: ModerationPipeline::standard(config, store.clone(), cache, hooks.clone()),
            formatter: MessageFormatter::new(&config.relay),
            interactions: default_router(reactions.clone(), actions.clone()),
            effects: EffectRunner::new(store.clone(), hooks, sink),
            store,
            registry,
            index,
            dispatcher,
            reactions,
            actions,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &Arc<MessageIndex> {
        &self.index
    }

    pub fn reactions(&self) -> &Arc<ReactionSync> {
        &self.reactions
    }

    pub fn actions(&self) -> &Arc<CrossCopyModerationActions> {
        &self.actions
    }

    pub fn interactions(&self) -> &InteractionRouter {
        &self.interactions
    }

    /// Wait for background side effects spawned so far.
    pub async fn drain_side_effects(&self) {
        self.effects.drain().await;
    }

    pub async fn handle_event(&self, event: &InboundEvent) -> Result<EventOutcome> {
        Ok(match event {
            InboundEvent::MessageCreated(message) => {
                EventOutcome::Message(self.handle_message(message).await?)
            },
            InboundEvent::ReactionAdded(reaction) => {
                EventOutcome::Reaction(self.reactions.handle_reaction(reaction).await?)
            },
            InboundEvent::ModerationRequested(request) => match request.action {
                ModerationAction::Delete => EventOutcome::Moderation(
                    self.actions
                        .delete_everywhere(&request.message_id, &request.actor_id)
                        .await?,
                ),
            },
            InboundEvent::InteractionInvoked(interaction) => {
                EventOutcome::Interaction(self.interactions.route(interaction).await?)
            },
        })
    }

    /// Relay a message posted in a connected channel to the rest of its hub.
    pub async fn handle_message(&self, message: &MessageCreated) -> Result<RelayOutcome> {
        if message.author.bot {
            return Ok(RelayOutcome::IgnoredBot);
        }
        let Some(source) = self.registry.resolve(&message.channel_id).await? else {
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::UNCONNECTED_TOTAL).increment(1);
            return Ok(RelayOutcome::NotConnected);
        };
        if !source.connected {
            return Ok(RelayOutcome::Paused);
        }
        let Some(hub) = self.store.get_hub(&source.hub_id).await? else {
            warn!(channel_id = %message.channel_id, hub_id = %source.hub_id, "connection points at a missing hub");
            return Ok(RelayOutcome::HubMissing);
        };
        if hub.locked {
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::LOCKED_TOTAL).increment(1);
            return Ok(RelayOutcome::HubLocked);
        }

        let evaluation = self.pipeline.evaluate(message, &hub).await?;
        self.effects.spawn(&hub, evaluation.effects);
        if let Verdict::Veto { gate, reason } = evaluation.verdict {
            return Ok(RelayOutcome::Vetoed { gate, reason });
        }

        let destinations: Vec<_> = self
            .registry
            .list_connected(&hub.id)
            .await?
            .into_iter()
            .filter(|c| c.channel_id != message.channel_id)
            .collect();
        let reply = self.reply_context(message, &hub).await;
        let request = RenderRequest {
            message,
            hub: &hub,
            content: &evaluation.content,
            censored: &evaluation.censored,
            reply: reply.as_ref(),
        };
        let deliveries = destinations
            .into_iter()
            .map(|connection| {
                let rendered = self.formatter.render(&request, &connection);
                Delivery {
                    connection,
                    payload: rendered.payload,
                    reply: rendered.reply,
                }
            })
            .collect();

        let results = self.dispatcher.fan_out(deliveries).await;
        let copies: Vec<BroadcastCopy> = results
            .iter()
            .filter_map(|r| r.copy_of(&message.message_id))
            .collect();
        let summary = RelaySummary {
            delivered: copies.len(),
            failed: results.len() - copies.len(),
            disabled: results.iter().filter(|r| r.disabled).count(),
            copies,
        };

        self.after_relay(message, &hub, reply.as_ref(), &summary.copies).await;
        #[cfg(feature = "metrics")]
        counter!(relay_metrics::MESSAGES_RELAYED_TOTAL).increment(1);
        info!(
            hub_id = %hub.id,
            channel_id = %message.channel_id,
            message_id = %message.message_id,
            delivered = summary.delivered,
            failed = summary.failed,
            "message relayed"
        );
        Ok(RelayOutcome::Relayed(summary))
    }

    async fn reply_context(&self, message: &MessageCreated, hub: &Hub) -> Option<ReplyContext> {
        let quoted = message.referenced.as_ref()?;
        let original = match self.index.resolve(&quoted.message_id).await {
            Ok(Some(original)) if original.hub_id == hub.id => original,
            Ok(_) => return None,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "could not resolve replied message");
                return None;
            },
        };
        let copies = match self.index.get_copies(&original.message_id, &hub.id).await {
            Ok(copies) => copies,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "could not load replied copies");
                Default::default()
            },
        };
        Some(ReplyContext {
            quoted: quoted.clone(),
            original,
            copies,
        })
    }

    /// Bookkeeping once copies exist. Failures here are logged, since the
    /// copies are already out.
    async fn after_relay(
        &self,
        message: &MessageCreated,
        hub: &Hub,
        reply: Option<&ReplyContext>,
        copies: &[BroadcastCopy],
    ) {
        let original = OriginalMessage {
            message_id: message.message_id.clone(),
            hub_id: hub.id.clone(),
            author_id: message.author.id.clone(),
            server_id: message.server_id.clone(),
            channel_id: message.channel_id.clone(),
            created_at: message.created_at,
            referenced_message_id: reply
                .map(|r| r.original.message_id.clone())
                .or_else(|| message.referenced.as_ref().map(|r| r.message_id.clone())),
            reactions: Default::default(),
        };
        if let Err(e) = self.index.record(&original, copies).await {
            warn!(message_id = %message.message_id, error = %e, "could not index relayed message");
        }

        let audit = MessageAudit {
            message_id: message.message_id.clone(),
            hub_id: hub.id.clone(),
            author_id: message.author.id.clone(),
            server_id: message.server_id.clone(),
            channel_id: message.channel_id.clone(),
            created_at: message.created_at,
            copy_count: u32::try_from(copies.len()).unwrap_or(u32::MAX),
        };
        if let Err(e) = self.store.record_audit(&audit).await {
            warn!(message_id = %message.message_id, error = %e, "could not write message audit");
        }

        if let Err(e) = self.registry.touch(&message.channel_id, now_ms()).await {
            warn!(channel_id = %message.channel_id, error = %e, "could not touch connection");
        }
    }

    /// Delete a hub with its connections, rules, moderators and indexed
    /// messages.
    pub async fn delete_hub(&self, hub_id: &str) -> Result<bool> {
        let deleted = self.store.delete_hub(hub_id).await?;
        if let Err(e) = self.registry.forget_hub(hub_id).await {
            warn!(hub_id, error = %e, "could not clear cached connections");
        }
        match self.index.purge_hub(hub_id).await {
            Ok(purged) => debug!(hub_id, purged, "purged indexed messages"),
            Err(e) => warn!(hub_id, error = %e, "could not purge indexed messages"),
        }
        Ok(deleted)
    }

    /// Move lapsed infractions to expired.
    pub async fn sweep_infractions(&self) -> Result<u64> {
        let expired = self.store.expire_due(now_ms()).await?;
        #[cfg(feature = "metrics")]
        counter!(moderation_metrics::INFRACTIONS_EXPIRED_TOTAL).increment(expired);
        if expired > 0 {
            info!(expired, "expired infractions");
        }
        Ok(expired)
    }
}
