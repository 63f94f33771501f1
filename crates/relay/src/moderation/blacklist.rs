use std::sync::Arc;

use {
    async_trait::async_trait,
    hublink_common::types::{InfractionKind, InfractionTarget, now_ms},
    hublink_store::Store,
};

use {
    super::{Accumulated, Gate, GateContext, GateDecision},
    crate::error::Result,
};

/// Vetoes authors, or whole servers, with an active blacklist in the hub.
pub struct BlacklistGate {
    store: Arc<dyn Store>,
}

impl BlacklistGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Gate for BlacklistGate {
    fn name(&self) -> &'static str {
        "blacklist"
    }

    async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision> {
        let now = now_ms();
        let targets = [
            InfractionTarget::User(ctx.message.author.id.clone()),
            InfractionTarget::Server(ctx.message.server_id.clone()),
        ];
        for target in &targets {
            let Some(infraction) = self
                .store
                .find_active(&ctx.hub.id, target, InfractionKind::Blacklist, now)
                .await?
            else {
                continue;
            };
            let who = match target {
                InfractionTarget::User(_) => "You are",
                InfractionTarget::Server(_) => "This server is",
            };
            acc.notify_author(
                ctx.message,
                format!(
                    "{who} blacklisted from **{}**: {}",
                    ctx.hub.name, infraction.reason
                ),
            );
            return Ok(GateDecision::Veto(format!(
                "{} blacklisted",
                target.kind()
            )));
        }
        Ok(GateDecision::Pass)
    }
}
