//! Domain records shared by the store, the cache-backed services and the relay.
//!
//! Timestamps are Unix epoch milliseconds throughout.

use std::{
    fmt,
    ops::BitOr,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generates `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// stored form is a fixed lowercase token.
macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $token:literal),+ $(,)? }) => {
        impl $ty {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok(Self::$variant),)+
                    other => Err(Error::unknown_variant($kind, other)),
                }
            }
        }
    };
}

// ── Hub ─────────────────────────────────────────────────────────────────────

/// Feature toggles stored on a hub as a bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HubSettings(u32);

impl HubSettings {
    /// Relayed messages carry the shared reaction control.
    pub const REACTIONS: Self = Self(1 << 0);
    /// Show the author's community nickname instead of their username.
    pub const USE_NICKNAMES: Self = Self(1 << 1);
    /// Veto messages whose images are flagged NSFW.
    pub const BLOCK_NSFW: Self = Self(1 << 2);
    /// Veto messages containing community invite links.
    pub const BLOCK_INVITES: Self = Self(1 << 3);
    /// Run the anti-spam gate.
    pub const SPAM_FILTER: Self = Self(1 << 4);
    /// Replace URLs in relayed content with a placeholder.
    pub const HIDE_LINKS: Self = Self(1 << 5);

    const ALL_BITS: u32 = (1 << 6) - 1;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds settings from stored bits, dropping bits no toggle uses.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::REACTIONS.with(Self::SPAM_FILTER)
    }
}

impl BitOr for HubSettings {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

/// A named relay group spanning channels in many communities.
#[derive(Clone, Serialize, Deserialize)]
pub struct Hub {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub private: bool,
    /// A locked hub relays nothing.
    pub locked: bool,
    pub settings: HubSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Webhook receiving moderator alerts (block-word hits, auto-blacklists).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub alert_webhook: Option<Secret<String>>,
    pub created_at: i64,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner_id", &self.owner_id)
            .field("private", &self.private)
            .field("locked", &self.locked)
            .field("settings", &self.settings)
            .field("icon_url", &self.icon_url)
            .field(
                "alert_webhook",
                &self.alert_webhook.as_ref().map(|_| "[REDACTED]"),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeratorRole {
    Moderator,
    Manager,
}

string_enum!(ModeratorRole, "moderator role", {
    Moderator => "moderator",
    Manager => "manager",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubModerator {
    pub hub_id: String,
    pub user_id: String,
    pub role: ModeratorRole,
}

// ── Connection ──────────────────────────────────────────────────────────────

/// How relayed messages are rendered in a destination channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Compact,
    #[default]
    Embed,
}

string_enum!(DisplayMode, "display mode", {
    Compact => "compact",
    Embed => "embed",
});

/// One channel's membership in a hub.
#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub channel_id: String,
    pub hub_id: String,
    /// Community (server) the channel lives in.
    pub server_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub webhook_url: Secret<String>,
    pub connected: bool,
    #[serde(default)]
    pub display_mode: DisplayMode,
    #[serde(default)]
    pub profanity_filter: bool,
    pub last_active_at: i64,
    pub created_at: i64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("channel_id", &self.channel_id)
            .field("hub_id", &self.hub_id)
            .field("server_id", &self.server_id)
            .field("webhook_url", &"[REDACTED]")
            .field("connected", &self.connected)
            .field("display_mode", &self.display_mode)
            .field("profanity_filter", &self.profanity_filter)
            .field("last_active_at", &self.last_active_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ── Infractions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    User,
    Server,
}

string_enum!(TargetKind, "infraction target kind", {
    User => "user",
    Server => "server",
});

/// Who an infraction applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum InfractionTarget {
    User(String),
    Server(String),
}

impl InfractionTarget {
    #[must_use]
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        match kind {
            TargetKind::User => Self::User(id.into()),
            TargetKind::Server => Self::Server(id.into()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::User(_) => TargetKind::User,
            Self::Server(_) => TargetKind::Server,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Server(id) => id,
        }
    }
}

impl fmt::Display for InfractionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfractionKind {
    Blacklist,
    Warning,
}

string_enum!(InfractionKind, "infraction kind", {
    Blacklist => "blacklist",
    Warning => "warning",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfractionStatus {
    Active,
    Revoked,
    Expired,
}

string_enum!(InfractionStatus, "infraction status", {
    Active => "active",
    Revoked => "revoked",
    Expired => "expired",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infraction {
    pub id: String,
    pub hub_id: String,
    pub target: InfractionTarget,
    pub kind: InfractionKind,
    pub reason: String,
    pub moderator_id: String,
    pub issued_at: i64,
    /// `None` means permanent.
    pub expires_at: Option<i64>,
    pub status: InfractionStatus,
}

impl Infraction {
    /// Active and not yet past its expiry.
    #[must_use]
    pub fn is_in_force(&self, now_ms: i64) -> bool {
        self.status == InfractionStatus::Active && self.expires_at.is_none_or(|at| at > now_ms)
    }
}

// ── Block words ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockWordAction {
    Block,
    Alert,
    AutoBlacklist,
}

string_enum!(BlockWordAction, "block-word action", {
    Block => "block",
    Alert => "alert",
    AutoBlacklist => "auto_blacklist",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWordRule {
    pub id: String,
    pub hub_id: String,
    pub name: String,
    /// Words or `*` wildcard patterns, matched case-insensitively as whole words.
    pub words: Vec<String>,
    pub actions: Vec<BlockWordAction>,
    pub created_at: i64,
}

// ── Audit ───────────────────────────────────────────────────────────────────

/// Durable identifiers-only record of a completed relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAudit {
    pub message_id: String,
    pub hub_id: String,
    pub author_id: String,
    pub server_id: String,
    pub channel_id: String,
    pub created_at: i64,
    pub copy_count: u32,
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_enable_reactions_and_spam_filter() {
        let settings = HubSettings::default();
        assert!(settings.contains(HubSettings::REACTIONS));
        assert!(settings.contains(HubSettings::SPAM_FILTER));
        assert!(!settings.contains(HubSettings::BLOCK_INVITES));
    }

    #[test]
    fn settings_truncate_unknown_bits() {
        let settings = HubSettings::from_bits_truncate(u32::MAX);
        assert_eq!(settings.bits(), 0b11_1111);
        let cleared = settings.without(HubSettings::HIDE_LINKS);
        assert!(!cleared.contains(HubSettings::HIDE_LINKS));
        assert!(cleared.contains(HubSettings::BLOCK_NSFW | HubSettings::BLOCK_INVITES));
    }

    #[test]
    fn string_enums_parse_their_tokens() {
        assert_eq!("compact".parse::<DisplayMode>().unwrap(), DisplayMode::Compact);
        assert_eq!(
            "auto_blacklist".parse::<BlockWordAction>().unwrap(),
            BlockWordAction::AutoBlacklist
        );
        assert!("Embed".parse::<DisplayMode>().is_err());
    }

    #[test]
    fn infraction_target_exposes_kind_and_id() {
        let target = InfractionTarget::new(TargetKind::Server, "guild-9");
        assert_eq!(target.kind(), TargetKind::Server);
        assert_eq!(target.id(), "guild-9");
        assert_eq!(target.to_string(), "server:guild-9");
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "server", "id": "guild-9"}));
    }

    #[test]
    fn expired_infraction_is_not_in_force() {
        let mut infraction = Infraction {
            id: "i1".into(),
            hub_id: "h1".into(),
            target: InfractionTarget::User("u1".into()),
            kind: InfractionKind::Blacklist,
            reason: "spam".into(),
            moderator_id: "m1".into(),
            issued_at: 1_000,
            expires_at: Some(2_000),
            status: InfractionStatus::Active,
        };
        assert!(infraction.is_in_force(1_500));
        assert!(!infraction.is_in_force(2_000));
        infraction.expires_at = None;
        assert!(infraction.is_in_force(i64::MAX));
        infraction.status = InfractionStatus::Revoked;
        assert!(!infraction.is_in_force(0));
    }

    #[test]
    fn connection_serializes_webhook_in_clear() {
        let conn = Connection {
            channel_id: "c1".into(),
            hub_id: "h1".into(),
            server_id: "s1".into(),
            webhook_url: Secret::new("https://hooks.example/1/abc".into()),
            connected: true,
            display_mode: DisplayMode::Compact,
            profanity_filter: false,
            last_active_at: 0,
            created_at: 0,
        };
        let json = serde_json::to_string(&conn).unwrap();
        assert!(json.contains("https://hooks.example/1/abc"));
        let back: Connection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.webhook_url.expose_secret(), "https://hooks.example/1/abc");
        assert!(!format!("{back:?}").contains("abc"));
    }
}
