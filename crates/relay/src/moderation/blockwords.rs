//! Hub-defined block-word rules.
//!
//! Each rule's words compile into one case-insensitive whole-word pattern,
//! where `*` stands for any run of word characters. Compiled patterns are
//! cached per rule and rebuilt when the rule's words change.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    hublink_common::types::{BlockWordAction, BlockWordRule, InfractionTarget},
    hublink_store::Store,
    regex::Regex,
    tracing::{debug, warn},
};

use {
    super::{Accumulated, Gate, GateContext, GateDecision, SideEffect},
    crate::{error::Result, platform::ModeratorAlert},
};

const EXCERPT_CHARS: usize = 200;

/// Build the matcher for a word list. `None` when no usable word remains.
pub fn compile_words(words: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty() && w.chars().any(|c| c != '*'))
        .map(|w| regex::escape(w).replace(r"\*", r"\w*"))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&pattern)
        .inspect_err(|e| warn!(%pattern, error = %e, "block-word pattern did not compile"))
        .ok()
}

struct Compiled {
    words: Vec<String>,
    regex: Option<Arc<Regex>>,
}

pub struct BlockWordEngine {
    store: Arc<dyn Store>,
    auto_blacklist: Duration,
    compiled: DashMap<String, Compiled>,
}

impl BlockWordEngine {
    pub fn new(store: Arc<dyn Store>, auto_blacklist: Duration) -> Self {
        Self {
            store,
            auto_blacklist,
            compiled: DashMap::new(),
        }
    }

    fn matcher(&self, rule: &BlockWordRule) -> Option<Arc<Regex>> {
        if let Some(hit) = self.compiled.get(&rule.id)
            && hit.words == rule.words
        {
            return hit.regex.clone();
        }
        let regex = compile_words(&rule.words).map(Arc::new);
        self.compiled.insert(rule.id.clone(), Compiled {
            words: rule.words.clone(),
            regex: regex.clone(),
        });
        regex
    }
}

#[async_trait]
impl Gate for BlockWordEngine {
    fn name(&self) -> &'static str {
        "blockwords"
    }

    async fn check(&self, ctx: &GateContext<'_>, acc: &mut Accumulated) -> Result<GateDecision> {
        let rules = self.store.list_rules(&ctx.hub.id).await?;
        let message = ctx.message;
        let mut blocked_by = None;

        for rule in &rules {
            let Some(regex) = self.matcher(rule) else {
                continue;
            };
            if !regex.is_match(&acc.content) {
                continue;
            }
            debug!(hub_id = %ctx.hub.id, rule = %rule.name, message_id = %message.message_id, "block-word rule matched");
            for action in &rule.actions {
                match action {
                    BlockWordAction::Block => {
                        blocked_by.get_or_insert_with(|| rule.name.clone());
                    },
                    BlockWordAction::Alert => {
                        acc.effects.push(SideEffect::AlertModerators(ModeratorAlert {
                            hub_id: ctx.hub.id.clone(),
                            reason: format!("Block-word rule \"{}\" matched", rule.name),
                            author_id: message.author.id.clone(),
                            server_id: message.server_id.clone(),
                            channel_id: message.channel_id.clone(),
                            message_id: message.message_id.clone(),
                            excerpt: message.content.chars().take(EXCERPT_CHARS).collect(),
                        }));
                    },
                    BlockWordAction::AutoBlacklist => {
                        acc.effects.push(SideEffect::Blacklist {
                            target: InfractionTarget::User(message.author.id.clone()),
                            duration: self.auto_blacklist,
                            reason: format!("Auto-blacklisted by block-word rule \"{}\"", rule.name),
                        });
                    },
                }
            }
        }

        let Some(rule_name) = blocked_by else {
            return Ok(GateDecision::Pass);
        };
        let reason = format!("Your message contains words blocked by the rule \"{rule_name}\".");
        acc.notify_author(message, reason.clone());
        Ok(GateDecision::Veto(reason))
    }
}
