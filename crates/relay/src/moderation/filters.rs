//! Content filters: profanity censoring, invite and NSFW vetoes, link hiding.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hublink_common::types::HubSettings,
    hublink_config::ContentConfig,
    regex::{Captures, Regex},
    tracing::warn,
};

use {
    super::{Accumulated, Gate, GateContext, GateDecision, blockwords::compile_words},
    crate::{error::Result, platform::PlatformHooks},
};

const INVITE_ACK: &str = "🚫";
const NSFW_ACK: &str = "🔞";

pub struct ContentFilters {
    profanity: Option<Regex>,
    invites: Option<Regex>,
    links: Option<Regex>,
    hidden_link_text: String,
    hooks: Arc<dyn PlatformHooks>,
}

impl ContentFilters {
    pub fn new(config: &ContentConfig, hooks: Arc<dyn PlatformHooks>) -> Self {
        let invites = if config.invite_hosts.is_empty() {
            None
        } else {
            let hosts: Vec<String> = config.invite_hosts.iter().map(|h| regex::escape(h)).collect();
            compile(&format!(r"(?i)\b(?:{})/\S+", hosts.join("|")))
        };
        Self {
            profanity: compile_words(&config.profanity),
            invites,
            links: compile(r"(?i)\bhttps?://\S+"),
            hidden_link_text: config.hidden_link_text.clone(),
            hooks,
        }
    }

    /// `content` with every profane word masked, or `None` when nothing matched.
    pub fn censor(&self, content: &str) -> Option<String> {
        let regex = self.profanity.as_ref()?;
        if !regex.is_match(content) {
            return None;
        }
        let censored = regex.replace_all(content, |caps: &Captures<'_>| {
            "*".repeat(caps[0].chars().count())
        });
        Some(censored.into_owned())
    }

    pub fn contains_invite(&self, content: &str) -> bool {
        self.invites.as_ref().is_some_and(|r| r.is_match(content))
    }

    pub fn hide_links(&self, content: &str) -> String {
        match &self.links {
            Some(regex) => regex
                .replace_all(content, regex::NoExpand(&self.hidden_link_text))
                .into_owned(),
            None => content.to_string(),
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .inspect_err(|e| warn!(pattern, error = %e, "content filter pattern did not compile"))
        .ok()
}

#[async_trait]
impl Gate for ContentFilters {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision> {
        let settings = ctx.hub.settings;
        let message = ctx.message;

        if settings.contains(HubSettings::BLOCK_INVITES) && self.contains_invite(&acc.content) {
            acc.ack(message, INVITE_ACK);
            return Ok(GateDecision::Veto("invite links are not allowed in this hub".into()));
        }

        if settings.contains(HubSettings::BLOCK_NSFW) {
            for attachment in message.attachments.iter().filter(|a| a.is_image()) {
                match self.hooks.is_nsfw(&attachment.url).await {
                    Ok(true) => {
                        acc.ack(message, NSFW_ACK);
                        return Ok(GateDecision::Veto("NSFW images are not allowed in this hub".into()));
                    },
                    Ok(false) => {},
                    Err(e) => {
                        warn!(message_id = %message.message_id, url = %attachment.url, error = %e, "NSFW detector failed");
                    },
                }
            }
        }

        if settings.contains(HubSettings::HIDE_LINKS) {
            acc.content = self.hide_links(&acc.content);
        }
        acc.censored = self.censor(&acc.content);
        Ok(GateDecision::Pass)
    }
}
