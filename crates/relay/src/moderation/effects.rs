//! Side effects produced by gates, run off the relay path.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    hublink_common::types::{Hub, Infraction, InfractionKind, InfractionStatus, InfractionTarget, now_ms},
    hublink_store::Store,
    hublink_webhook::{AllowedMentions, Embed, EmbedFooter, WebhookPayload, WebhookSink},
    secrecy::ExposeSecret,
    tokio::task::JoinSet,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, labels, moderation as moderation_metrics};

use crate::{
    error::Result,
    platform::{ModeratorAlert, PlatformHooks},
};

/// Moderator id recorded on infractions the relay issues by itself.
pub const AUTOMOD_ID: &str = "automod";

const ALERT_COLOR: u32 = 0xED4245;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    NotifyAuthor {
        channel_id: String,
        user_id: String,
        notice: String,
    },
    AckReaction {
        channel_id: String,
        message_id: String,
        emoji: String,
    },
    AlertModerators(ModeratorAlert),
    Blacklist {
        target: InfractionTarget,
        duration: Duration,
        reason: String,
    },
}

impl SideEffect {
    fn label(&self) -> &'static str {
        match self {
            Self::NotifyAuthor { .. } => "notify_author",
            Self::AckReaction { .. } => "ack_reaction",
            Self::AlertModerators(_) => "alert_moderators",
            Self::Blacklist { .. } => "blacklist",
        }
    }
}

/// Runs side effects in background tasks. Failures are logged and never
/// reach the caller.
#[derive(Clone)]
pub struct EffectRunner {
    store: Arc<dyn Store>,
    hooks: Arc<dyn PlatformHooks>,
    sink: Arc<dyn WebhookSink>,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl EffectRunner {
    pub fn new(
        store: Arc<dyn Store>,
        hooks: Arc<dyn PlatformHooks>,
        sink: Arc<dyn WebhookSink>,
    ) -> Self {
        Self {
            store,
            hooks,
            sink,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Start running `effects` in order on a background task.
    pub fn spawn(&self, hub: &Hub, effects: Vec<SideEffect>) {
        if effects.is_empty() {
            return;
        }
        let runner = self.clone();
        let hub = hub.clone();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            for effect in effects {
                let label = effect.label();
                if let Err(e) = runner.run(&hub, effect).await {
                    warn!(hub_id = %hub.id, effect = label, error = %e, "side effect failed");
                    #[cfg(feature = "metrics")]
                    counter!(moderation_metrics::SIDE_EFFECT_FAILURES_TOTAL, labels::EFFECT => label)
                        .increment(1);
                }
            }
        });
    }

    /// Wait for every effect spawned so far.
    pub async fn drain(&self) {
        let mut set = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "side effect task panicked");
            }
        }
    }

    pub async fn run(&self, hub: &Hub, effect: SideEffect) -> Result<()> {
        match effect {
            SideEffect::NotifyAuthor {
                channel_id,
                user_id,
                notice,
            } => self.hooks.notify_author(&channel_id, &user_id, &notice).await,
            SideEffect::AckReaction {
                channel_id,
                message_id,
                emoji,
            } => self.hooks.add_reaction(&channel_id, &message_id, &emoji).await,
            SideEffect::AlertModerators(alert) => self.alert(hub, &alert).await,
            SideEffect::Blacklist {
                target,
                duration,
                reason,
            } => self.blacklist(hub, target, duration, reason).await,
        }
    }

    async fn alert(&self, hub: &Hub, alert: &ModeratorAlert) -> Result<()> {
        let Some(webhook) = &hub.alert_webhook else {
            return self.hooks.alert_moderators(hub, alert).await;
        };
        let payload = WebhookPayload {
            username: Some(format!("{} alerts", hub.name)),
            embeds: vec![Embed {
                description: Some(format!(
                    "**{}**\nAuthor: `{}` in server `{}` (channel `{}`)\n>>> {}",
                    alert.reason, alert.author_id, alert.server_id, alert.channel_id, alert.excerpt
                )),
                color: Some(ALERT_COLOR),
                footer: Some(EmbedFooter {
                    text: format!("message {}", alert.message_id),
                    icon_url: None,
                }),
                ..Embed::default()
            }],
            allowed_mentions: Some(AllowedMentions::none()),
            ..WebhookPayload::default()
        };
        if let Err(e) = self.sink.execute(webhook.expose_secret(), &payload).await {
            warn!(hub_id = %hub.id, error = %e, "alert webhook failed, using platform hook");
            return self.hooks.alert_moderators(hub, alert).await;
        }
        Ok(())
    }

    async fn blacklist(
        &self,
        hub: &Hub,
        target: InfractionTarget,
        duration: Duration,
        reason: String,
    ) -> Result<()> {
        let now = now_ms();
        if self
            .store
            .find_active(&hub.id, &target, InfractionKind::Blacklist, now)
            .await?
            .is_some()
        {
            debug!(hub_id = %hub.id, %target, "already blacklisted");
            return Ok(());
        }
        let infraction = Infraction {
            id: uuid::Uuid::new_v4().to_string(),
            hub_id: hub.id.clone(),
            target,
            kind: InfractionKind::Blacklist,
            reason,
            moderator_id: AUTOMOD_ID.to_string(),
            issued_at: now,
            expires_at: Some(now + i64::try_from(duration.as_millis()).unwrap_or(i64::MAX / 2)),
            status: InfractionStatus::Active,
        };
        self.store.issue(&infraction).await?;
        #[cfg(feature = "metrics")]
        counter!(moderation_metrics::AUTO_BLACKLISTS_TOTAL).increment(1);
        debug!(hub_id = %hub.id, target = %infraction.target, "auto-blacklisted");
        Ok(())
    }
}
