//! Per-destination rendering of a relayed message.
//!
//! Embed destinations get a card posted under the hub's name, compact ones
//! get plain text posted under the author's name. Both resolve replies the
//! same way: a jump link to the copy of the referenced message that lives in
//! the destination channel.

use std::collections::BTreeMap;

use {
    hublink_common::types::{Connection, DisplayMode, Hub, HubSettings},
    hublink_config::RelayConfig,
    hublink_webhook::{
        ActionRow, AllowedMentions, Button, Embed, EmbedAuthor, EmbedFooter, EmbedImage,
        WebhookPayload,
    },
};

use crate::{
    events::{MessageCreated, ReferencedMessage},
    index::{BroadcastCopy, OriginalMessage, ReplyLink},
};

/// Link to a message in a channel of a server.
pub fn jump_url(server_id: &str, channel_id: &str, message_id: &str) -> String {
    format!("https://discord.com/channels/{server_id}/{channel_id}/{message_id}")
}

/// Shorten to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// The referenced message of a reply, located in the index.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub quoted: ReferencedMessage,
    pub original: OriginalMessage,
    pub copies: BTreeMap<String, BroadcastCopy>,
}

impl ReplyContext {
    /// Where the referenced message can be found from `destination`: its
    /// local copy, or the original when the destination is where it was
    /// posted.
    pub fn jump_url(&self, destination: &Connection) -> Option<String> {
        if destination.channel_id == self.original.channel_id {
            return Some(jump_url(
                &self.original.server_id,
                &self.original.channel_id,
                &self.original.message_id,
            ));
        }
        self.copies.get(&destination.channel_id).map(|copy| {
            jump_url(&destination.server_id, &copy.channel_id, &copy.message_id)
        })
    }
}

/// Everything shared by the renders of one message.
pub struct RenderRequest<'a> {
    pub message: &'a MessageCreated,
    pub hub: &'a Hub,
    /// Content after gate rewrites.
    pub content: &'a str,
    /// Profanity-censored variant, used where the destination filters.
    pub censored: &'a str,
    pub reply: Option<&'a ReplyContext>,
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub payload: WebhookPayload,
    /// The reply button, when one was rendered.
    pub reply: Option<ReplyLink>,
}

pub struct MessageFormatter {
    branding: String,
    preview_chars: usize,
}

impl MessageFormatter {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            branding: config.branding_name.clone(),
            preview_chars: config.reply_preview_chars,
        }
    }

    pub fn render(&self, req: &RenderRequest<'_>, destination: &Connection) -> Rendered {
        let content = if destination.profanity_filter {
            req.censored
        } else {
            req.content
        };
        let reply_url = req.reply.and_then(|r| r.jump_url(destination));
        match destination.display_mode {
            DisplayMode::Embed => self.embed(req, content, reply_url),
            DisplayMode::Compact => self.compact(req, content, reply_url.as_deref()),
        }
    }

    fn embed(&self, req: &RenderRequest<'_>, content: &str, reply_url: Option<String>) -> Rendered {
        let message = req.message;
        let mut description = content.to_string();
        let mut image = None;
        for attachment in &message.attachments {
            if image.is_none() && attachment.is_image() {
                image = Some(EmbedImage {
                    url: attachment.url.clone(),
                });
                continue;
            }
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(&attachment.url);
        }

        let reply = reply_url.map(|url| ReplyLink {
            url,
            label: req
                .reply
                .map(|r| truncate(&format!("Reply to @{}", r.quoted.author_name), 80))
                .unwrap_or_else(|| "Jump to reply".into()),
        });
        let components = reply
            .as_ref()
            .map(|r| vec![ActionRow::new(vec![Button::link(r.url.clone(), r.label.clone())])]);

        let payload = WebhookPayload {
            content: None,
            username: Some(req.hub.name.clone()),
            avatar_url: req.hub.icon_url.clone(),
            embeds: vec![Embed {
                description: (!description.is_empty()).then_some(description),
                author: Some(EmbedAuthor {
                    name: display_name(req),
                    icon_url: message.author.avatar_url.clone(),
                }),
                footer: Some(EmbedFooter {
                    text: format!("{} • {}", self.branding, message.server_name),
                    icon_url: None,
                }),
                image,
                ..Embed::default()
            }],
            components,
            allowed_mentions: Some(AllowedMentions::none()),
        };
        Rendered { payload, reply }
    }

    fn compact(&self, req: &RenderRequest<'_>, content: &str, reply_url: Option<&str>) -> Rendered {
        let message = req.message;
        let name = display_name(req);
        let mut lines = vec![format!("**@{name}** • {}", message.server_name)];
        if let Some(reply) = req.reply {
            let quoted = &reply.quoted;
            let preview = truncate(&quoted.content.replace('\n', " "), self.preview_chars);
            lines.push(match reply_url {
                Some(url) => format!("> [**{}**](<{url}>): {preview}", quoted.author_name),
                None => format!("> **{}**: {preview}", quoted.author_name),
            });
        }
        if !content.is_empty() {
            lines.push(content.to_string());
        }
        lines.extend(message.attachments.iter().map(|a| a.url.clone()));

        let payload = WebhookPayload {
            content: Some(lines.join("\n")),
            username: Some(name),
            avatar_url: message.author.avatar_url.clone(),
            allowed_mentions: Some(AllowedMentions::none()),
            ..WebhookPayload::default()
        };
        Rendered {
            payload,
            reply: None,
        }
    }
}

fn display_name(req: &RenderRequest<'_>) -> String {
    let author = &req.message.author;
    match &author.nickname {
        Some(nick) if req.hub.settings.contains(HubSettings::USE_NICKNAMES) => nick.clone(),
        _ => author.username.clone(),
    }
}
