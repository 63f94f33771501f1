use std::time::Duration;

use {
    anyhow::{Context, Result, bail},
    clap::{Args, Subcommand},
    hublink_common::types::{
        BlockWordAction, BlockWordRule, Connection, DisplayMode, Hub, HubModerator, HubSettings,
        Infraction, InfractionKind, InfractionStatus, InfractionTarget, ModeratorRole, now_ms,
    },
    hublink_config::HublinkConfig,
    hublink_relay::Relay,
    hublink_store::{BlockWordStore, HubStore, InfractionStore},
    secrecy::Secret,
};

use crate::db_commands::open_relay;

#[derive(Subcommand)]
pub enum HubAction {
    /// Create a hub.
    Create {
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        private: bool,
        #[arg(long)]
        icon_url: Option<String>,
        /// Settings to enable, comma separated (reactions, use_nicknames,
        /// block_nsfw, block_invites, spam_filter, hide_links).
        #[arg(long, value_delimiter = ',')]
        settings: Option<Vec<String>>,
    },
    /// Connect a channel to a hub through its webhook.
    Connect {
        /// Hub id or name.
        hub: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        server: String,
        #[arg(long, env = "HUBLINK_WEBHOOK_URL", hide_env_values = true)]
        webhook_url: String,
        #[arg(long, default_value = "embed")]
        mode: String,
        #[arg(long)]
        profanity_filter: bool,
    },
    /// Pause or resume a connection.
    Pause {
        channel: String,
        #[arg(long)]
        resume: bool,
    },
    /// Lock or unlock a hub.
    Lock {
        hub: String,
        #[arg(long)]
        unlock: bool,
    },
    /// Delete a hub with its connections, rules and moderators.
    Delete { hub: String },
    /// Add a hub moderator.
    Moderator {
        hub: String,
        user: String,
        #[arg(long, default_value = "moderator")]
        role: String,
    },
    /// Add or replace a block-word rule.
    Rule {
        hub: String,
        name: String,
        #[arg(long, value_delimiter = ',', required = true)]
        words: Vec<String>,
        #[arg(long, value_delimiter = ',', default_value = "block")]
        actions: Vec<String>,
    },
    /// Blacklist a user or server from a hub.
    Blacklist(InfractionArgs),
    /// Record a warning against a user or server.
    Warn(InfractionArgs),
}

#[derive(Args)]
pub struct InfractionArgs {
    hub: String,
    #[arg(long, conflicts_with = "server", required_unless_present = "server")]
    user: Option<String>,
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    reason: String,
    /// Lifetime in minutes; permanent when omitted.
    #[arg(long)]
    minutes: Option<u64>,
    #[arg(long, default_value = "cli")]
    moderator: String,
}

pub async fn handle_hub(action: &HubAction, config: &HublinkConfig) -> Result<()> {
    let relay = open_relay(config).await?;
    let store = relay.store();
    match action {
        HubAction::Create {
            name,
            owner,
            private,
            icon_url,
            settings,
        } => {
            let settings = match settings {
                Some(names) => parse_settings(names)?,
                None => HubSettings::default(),
            };
            let hub = Hub {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.clone(),
                owner_id: owner.clone(),
                private: *private,
                locked: false,
                settings,
                icon_url: icon_url.clone(),
                alert_webhook: None,
                created_at: now_ms(),
            };
            store.create_hub(&hub).await?;
            println!("Created hub {} ({})", hub.name, hub.id);
        },
        HubAction::Connect {
            hub,
            channel,
            server,
            webhook_url,
            mode,
            profanity_filter,
        } => {
            let hub = find_hub(&relay, hub).await?;
            let now = now_ms();
            let connection = Connection {
                channel_id: channel.clone(),
                hub_id: hub.id.clone(),
                server_id: server.clone(),
                webhook_url: Secret::new(webhook_url.clone()),
                connected: true,
                display_mode: mode.parse::<DisplayMode>()?,
                profanity_filter: *profanity_filter,
                last_active_at: now,
                created_at: now,
            };
            relay.registry().upsert(&connection).await?;
            println!("Connected channel {channel} to hub {}", hub.name);
        },
        HubAction::Pause { channel, resume } => {
            if !relay.registry().set_connected(channel, *resume).await? {
                bail!("channel {channel} is not connected to any hub");
            }
            println!("Channel {channel} {}", if *resume { "resumed" } else { "paused" });
        },
        HubAction::Lock { hub, unlock } => {
            let mut hub = find_hub(&relay, hub).await?;
            hub.locked = !*unlock;
            store.update_hub(&hub).await?;
            println!("Hub {} {}", hub.name, if hub.locked { "locked" } else { "unlocked" });
        },
        HubAction::Delete { hub } => {
            let hub = find_hub(&relay, hub).await?;
            relay.delete_hub(&hub.id).await?;
            println!("Deleted hub {}", hub.name);
        },
        HubAction::Moderator { hub, user, role } => {
            let hub = find_hub(&relay, hub).await?;
            store
                .add_moderator(&HubModerator {
                    hub_id: hub.id.clone(),
                    user_id: user.clone(),
                    role: role.parse::<ModeratorRole>()?,
                })
                .await?;
            println!("{user} is now a {role} of {}", hub.name);
        },
        HubAction::Rule {
            hub,
            name,
            words,
            actions,
        } => {
            let hub = find_hub(&relay, hub).await?;
            let actions = actions
                .iter()
                .map(|a| a.parse::<BlockWordAction>())
                .collect::<Result<Vec<_>, _>>()?;
            let existing = store.list_rules(&hub.id).await?;
            let id = existing
                .iter()
                .find(|r| &r.name == name)
                .map(|r| r.id.clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            store
                .upsert_rule(
                    &BlockWordRule {
                        id,
                        hub_id: hub.id.clone(),
                        name: name.clone(),
                        words: words.clone(),
                        actions,
                        created_at: now_ms(),
                    },
                    config.blockwords.max_rules_per_hub,
                )
                .await?;
            println!("Saved rule {name} for hub {}", hub.name);
        },
        HubAction::Blacklist(args) => issue(&relay, args, InfractionKind::Blacklist).await?,
        HubAction::Warn(args) => issue(&relay, args, InfractionKind::Warning).await?,
    }
    Ok(())
}

async fn find_hub(relay: &Relay, id_or_name: &str) -> Result<Hub> {
    let store = relay.store();
    if let Some(hub) = store.get_hub(id_or_name).await? {
        return Ok(hub);
    }
    store
        .find_hub_by_name(id_or_name)
        .await?
        .with_context(|| format!("no hub named {id_or_name}"))
}

async fn issue(relay: &Relay, args: &InfractionArgs, kind: InfractionKind) -> Result<()> {
    let hub = find_hub(relay, &args.hub).await?;
    let target = match (&args.user, &args.server) {
        (Some(user), _) => InfractionTarget::User(user.clone()),
        (None, Some(server)) => InfractionTarget::Server(server.clone()),
        (None, None) => bail!("either --user or --server is required"),
    };
    let now = now_ms();
    let expires_at = args
        .minutes
        .map(|m| now + i64::try_from(Duration::from_secs(m * 60).as_millis()).unwrap_or(i64::MAX / 2));
    let infraction = Infraction {
        id: uuid::Uuid::new_v4().to_string(),
        hub_id: hub.id.clone(),
        target,
        kind,
        reason: args.reason.clone(),
        moderator_id: args.moderator.clone(),
        issued_at: now,
        expires_at,
        status: InfractionStatus::Active,
    };
    relay.store().issue(&infraction).await?;
    println!("Issued {kind} for {} in hub {}", infraction.target, hub.name);
    Ok(())
}

fn parse_settings(names: &[String]) -> Result<HubSettings> {
    names.iter().try_fold(HubSettings::empty(), |acc, name| {
        let flag = match name.trim() {
            "reactions" => HubSettings::REACTIONS,
            "use_nicknames" => HubSettings::USE_NICKNAMES,
            "block_nsfw" => HubSettings::BLOCK_NSFW,
            "block_invites" => HubSettings::BLOCK_INVITES,
            "spam_filter" => HubSettings::SPAM_FILTER,
            "hide_links" => HubSettings::HIDE_LINKS,
            other => bail!("unknown hub setting {other:?}"),
        };
        Ok(acc.with(flag))
    })
}
