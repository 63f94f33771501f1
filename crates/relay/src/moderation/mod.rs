//! Ordered gates deciding whether a message may be relayed.
//!
//! Gates run in a fixed order and the first veto wins. Each gate may also
//! queue side effects, which are handed back to the caller and run in the
//! background, so they never change the verdict.

pub mod antispam;
pub mod blacklist;
pub mod blockwords;
pub mod effects;
pub mod filters;

use std::sync::Arc;

use {
    async_trait::async_trait,
    hublink_cache::SharedCache,
    hublink_common::types::Hub,
    hublink_config::HublinkConfig,
    hublink_store::Store,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use hublink_metrics::{counter, labels, relay as relay_metrics};

pub use {
    antispam::AntiSpam,
    blacklist::BlacklistGate,
    blockwords::BlockWordEngine,
    effects::{EffectRunner, SideEffect},
    filters::ContentFilters,
};

use crate::{error::Result, events::MessageCreated, platform::PlatformHooks};

/// What a gate sees.
pub struct GateContext<'a> {
    pub message: &'a MessageCreated,
    pub hub: &'a Hub,
}

/// State carried from one gate to the next.
#[derive(Debug, Clone, Default)]
pub struct Accumulated {
    /// Content after rewrites such as link hiding.
    pub content: String,
    /// Profanity-censored variant of `content`, when the filter changed it.
    pub censored: Option<String>,
    pub effects: Vec<SideEffect>,
}

impl Accumulated {
    fn notify_author(&mut self, message: &MessageCreated, notice: impl Into<String>) {
        self.effects.push(SideEffect::NotifyAuthor {
            channel_id: message.channel_id.clone(),
            user_id: message.author.id.clone(),
            notice: notice.into(),
        });
    }

    fn ack(&mut self, message: &MessageCreated, emoji: &str) {
        self.effects.push(SideEffect::AckReaction {
            channel_id: message.channel_id.clone(),
            message_id: message.message_id.clone(),
            emoji: emoji.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    /// User-facing reason.
    Veto(String),
}

#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Veto { gate: &'static str, reason: String },
}

/// Outcome of running every gate.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub content: String,
    pub censored: String,
    pub effects: Vec<SideEffect>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

pub struct ModerationPipeline {
    gates: Vec<Box<dyn Gate>>,
}

impl ModerationPipeline {
    pub fn new(gates: Vec<Box<dyn Gate>>) -> Self {
        Self { gates }
    }

    /// Blacklist, anti-spam, block words, then content filters.
    pub fn standard(
        config: &HublinkConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn SharedCache>,
        hooks: Arc<dyn PlatformHooks>,
    ) -> Self {
        Self::new(vec![
            Box::new(BlacklistGate::new(store.clone())),
            Box::new(AntiSpam::new(cache, config.antispam.clone())),
            Box::new(BlockWordEngine::new(store, config.blockwords.auto_blacklist())),
            Box::new(ContentFilters::new(&config.content, hooks)),
        ])
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub async fn evaluate(&self, message: &MessageCreated, hub: &Hub) -> Result<Evaluation> {
        let ctx = GateContext { message, hub };
        let mut acc = Accumulated {
            content: message.content.clone(),
            ..Accumulated::default()
        };
        for gate in &self.gates {
            if let GateDecision::Veto(reason) = gate.check(&ctx, &mut acc).await? {
                debug!(
                    hub_id = %hub.id,
                    message_id = %message.message_id,
                    gate = gate.name(),
                    %reason,
                    "message vetoed"
                );
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::VETOES_TOTAL, labels::GATE => gate.name()).increment(1);
                return Ok(finish(
                    Verdict::Veto {
                        gate: gate.name(),
                        reason,
                    },
                    acc,
                ));
            }
        }
        Ok(finish(Verdict::Pass, acc))
    }
}

fn finish(verdict: Verdict, acc: Accumulated) -> Evaluation {
    let censored = acc.censored.unwrap_or_else(|| acc.content.clone());
    Evaluation {
        verdict,
        content: acc.content,
        censored,
        effects: acc.effects,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{hub, message},
    };

    struct Fixed(&'static str, Option<&'static str>);

    #[async_trait]
    impl Gate for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision> {
            acc.notify_author(ctx.message, self.0);
            Ok(match self.1 {
                Some(reason) => GateDecision::Veto(reason.into()),
                None => GateDecision::Pass,
            })
        }
    }

    #[tokio::test]
    async fn first_veto_short_circuits() {
        let pipeline = ModerationPipeline::new(vec![
            Box::new(Fixed("one", None)),
            Box::new(Fixed("two", Some("nope"))),
            Box::new(Fixed("three", Some("never reached"))),
        ]);
        let eval = pipeline.evaluate(&message("m1", "a", "hi"), &hub("h1")).await.unwrap();
        assert_eq!(eval.verdict, Verdict::Veto {
            gate: "two",
            reason: "nope".into()
        });
        assert_eq!(eval.effects.len(), 2);
    }

    #[tokio::test]
    async fn pass_without_censoring_uses_content() {
        let pipeline = ModerationPipeline::new(vec![Box::new(Fixed("one", None))]);
        let eval = pipeline.evaluate(&message("m1", "a", "hi"), &hub("h1")).await.unwrap();
        assert!(eval.passed());
        assert_eq!(eval.censored, "hi");
    }
}
