//! Config schema for the relay (database, cache, relay, moderation, staff, metrics).
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HublinkConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub relay: RelayConfig,
    pub antispam: AntiSpamConfig,
    pub blockwords: BlockWordsConfig,
    pub content: ContentConfig,
    pub staff: StaffConfig,
    pub metrics: MetricsConfig,
}

/// Relational store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL. Only `sqlite:` URLs are bundled.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://hublink.db?mode=rwc".into(),
            max_connections: 8,
        }
    }
}

/// Shared cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a hub's connection directory stays cached after a store read.
    pub connection_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            connection_ttl_secs: 600,
        }
    }
}

impl CacheConfig {
    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }
}

/// Fan-out and message index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum number of destinations delivered to at once.
    pub fanout_concurrency: usize,
    /// Per-destination delivery timeout.
    pub delivery_timeout_ms: u64,
    /// How long relayed messages stay resolvable for replies, reactions and deletes.
    pub message_ttl_secs: u64,
    /// Distinct emoji allowed on one relayed message.
    pub max_reaction_kinds: usize,
    /// Lifetime of the delete-in-progress marker.
    pub delete_marker_secs: u64,
    /// Reply previews are cut to this many characters.
    pub reply_preview_chars: usize,
    /// Name shown in embed footers next to the hub name.
    pub branding_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fanout_concurrency: 32,
            delivery_timeout_ms: 10_000,
            message_ttl_secs: 86_400,
            max_reaction_kinds: 10,
            delete_marker_secs: 60,
            reply_preview_chars: 100,
            branding_name: "hublink".into(),
        }
    }
}

impl RelayConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    pub fn delete_marker_ttl(&self) -> Duration {
        Duration::from_secs(self.delete_marker_secs)
    }
}

/// Per-author flood detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiSpamConfig {
    /// Timestamps kept per author.
    pub max_messages: usize,
    /// A veto fires when all kept timestamps fall inside this window.
    pub window_ms: u64,
    pub strike_decay_secs: u64,
    /// Strikes that trigger an automatic blacklist.
    pub strike_threshold: u32,
    pub auto_blacklist_secs: u64,
    /// Same character repeated at least this many times in a row is spam.
    pub repeated_char_threshold: usize,
}

impl Default for AntiSpamConfig {
    fn default() -> Self {
        Self {
            max_messages: 3,
            window_ms: 5_000,
            strike_decay_secs: 60,
            strike_threshold: 3,
            auto_blacklist_secs: 600,
            repeated_char_threshold: 10,
        }
    }
}

impl AntiSpamConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn strike_decay(&self) -> Duration {
        Duration::from_secs(self.strike_decay_secs)
    }

    pub fn auto_blacklist(&self) -> Duration {
        Duration::from_secs(self.auto_blacklist_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockWordsConfig {
    pub max_rules_per_hub: usize,
    /// Expiry of blacklists issued by an `auto_blacklist` rule action.
    pub auto_blacklist_secs: u64,
}

impl Default for BlockWordsConfig {
    fn default() -> Self {
        Self {
            max_rules_per_hub: 5,
            auto_blacklist_secs: 600,
        }
    }
}

impl BlockWordsConfig {
    pub fn auto_blacklist(&self) -> Duration {
        Duration::from_secs(self.auto_blacklist_secs)
    }
}

/// Content filter word lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Words replaced with asterisks for destinations with the profanity filter on.
    pub profanity: Vec<String>,
    /// Hosts treated as community invite links.
    pub invite_hosts: Vec<String>,
    /// Replacement text used when a hub hides links.
    pub hidden_link_text: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            profanity: Vec::new(),
            invite_hosts: vec![
                "discord.gg".into(),
                "discord.com/invite".into(),
                "discordapp.com/invite".into(),
            ],
            hidden_link_text: "[link hidden]".into(),
        }
    }
}

/// Platform staff who may moderate any hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffConfig {
    pub user_ids: Vec<String>,
}

impl StaffConfig {
    pub fn is_staff(&self, user_id: &str) -> bool {
        self.user_ids.iter().any(|id| id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address for the Prometheus scrape listener, when built with `prometheus`.
    pub listen: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = HublinkConfig::default();
        assert_eq!(cfg.cache.connection_ttl(), Duration::from_secs(600));
        assert_eq!(cfg.relay.fanout_concurrency, 32);
        assert_eq!(cfg.relay.delivery_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.relay.message_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.relay.max_reaction_kinds, 10);
        assert_eq!(cfg.antispam.max_messages, 3);
        assert_eq!(cfg.antispam.window(), Duration::from_secs(5));
        assert_eq!(cfg.antispam.strike_threshold, 3);
        assert_eq!(cfg.antispam.repeated_char_threshold, 10);
        assert_eq!(cfg.blockwords.max_rules_per_hub, 5);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: HublinkConfig = toml::from_str(
            r#"
            [relay]
            fanout_concurrency = 4

            [staff]
            user_ids = ["42"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.relay.fanout_concurrency, 4);
        assert_eq!(cfg.relay.delivery_timeout_ms, 10_000);
        assert!(cfg.staff.is_staff("42"));
        assert!(!cfg.staff.is_staff("7"));
        assert_eq!(cfg.database, DatabaseConfig::default());
    }
}
