//! Per-author flood and repeated-character detection.
//!
//! Recent timestamps and strike counts live in the shared cache so every
//! relay process sees the same window. Both use atomic cache operations,
//! never a read-modify-write.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hublink_cache::{SharedCache, keys},
    hublink_common::types::{HubSettings, InfractionTarget},
    hublink_config::AntiSpamConfig,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, moderation as moderation_metrics};

use {
    super::{Accumulated, Gate, GateContext, GateDecision, SideEffect},
    crate::error::Result,
};

const STRIKES_FIELD: &str = "strikes";

pub struct AntiSpam {
    cache: Arc<dyn SharedCache>,
    config: AntiSpamConfig,
}

impl AntiSpam {
    pub fn new(cache: Arc<dyn SharedCache>, config: AntiSpamConfig) -> Self {
        Self { cache, config }
    }

    /// Whether the author's last `max_messages` posts, this one included,
    /// all fall inside the window.
    async fn flooding(&self, author_id: &str, created_at: i64) -> hublink_cache::Result<bool> {
        let recent = self
            .cache
            .push_recent(
                &keys::spam_window(author_id),
                &created_at.to_string(),
                self.config.max_messages,
                self.config.window(),
            )
            .await?;
        if recent.len() < self.config.max_messages {
            return Ok(false);
        }
        let stamps: Vec<i64> = recent.iter().filter_map(|s| s.parse().ok()).collect();
        let (Some(newest), Some(oldest)) = (stamps.first(), stamps.last()) else {
            return Ok(false);
        };
        let window_ms = i64::try_from(self.config.window_ms).unwrap_or(i64::MAX);
        Ok(newest.saturating_sub(*oldest) < window_ms)
    }

    async fn strike(&self, author_id: &str) -> hublink_cache::Result<bool> {
        let key = keys::spam_strikes(author_id);
        let strikes = self
            .cache
            .hincr(&key, STRIKES_FIELD, 1, Some(self.config.strike_decay()))
            .await?;
        #[cfg(feature = "metrics")]
        counter!(moderation_metrics::STRIKES_TOTAL).increment(1);
        if strikes < i64::from(self.config.strike_threshold) {
            return Ok(false);
        }
        self.cache.delete(&[key]).await?;
        Ok(true)
    }
}

/// Whether any character, whitespace included, repeats `threshold` times in
/// a row.
pub fn has_repeated_run(content: &str, threshold: usize) -> bool {
    if threshold < 2 {
        return false;
    }
    let mut previous = None;
    let mut run = 0usize;
    for c in content.chars() {
        if previous == Some(c) {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if run >= threshold {
            return true;
        }
    }
    false
}

#[async_trait]
impl Gate for AntiSpam {
    fn name(&self) -> &'static str {
        "antispam"
    }

    async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision> {
        if !ctx.hub.settings.contains(HubSettings::SPAM_FILTER) {
            return Ok(GateDecision::Pass);
        }
        let author_id = &ctx.message.author.id;

        let flooding = match self.flooding(author_id, ctx.message.created_at).await {
            Ok(flooding) => flooding,
            Err(e) => {
                warn!(author_id, error = %e, "spam window unavailable, letting message through");
                false
            },
        };
        let repeated = has_repeated_run(&ctx.message.content, self.config.repeated_char_threshold);
        if !flooding && !repeated {
            return Ok(GateDecision::Pass);
        }

        match self.strike(author_id).await {
            Ok(true) => {
                debug!(author_id, hub_id = %ctx.hub.id, "strike threshold reached");
                acc.effects.push(SideEffect::Blacklist {
                    target: InfractionTarget::User(author_id.clone()),
                    duration: self.config.auto_blacklist(),
                    reason: "Automatic blacklist for spamming".into(),
                });
                acc.notify_author(
                    ctx.message,
                    format!(
                        "You have been blacklisted from **{}** for {} minutes for spamming.",
                        ctx.hub.name,
                        self.config.auto_blacklist_secs / 60
                    ),
                );
            },
            Ok(false) => {
                acc.notify_author(ctx.message, "You are sending messages too quickly. Slow down!");
            },
            Err(e) => warn!(author_id, error = %e, "could not record spam strike"),
        }

        let reason = if repeated {
            "repeated characters"
        } else {
            "too many messages"
        };
        Ok(GateDecision::Veto(reason.into()))
    }
}
