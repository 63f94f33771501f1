//! Relational persistence for hubs and everything that hangs off them.
//!
//! The store is the authority for connection membership, infractions and
//! block-word rules; caches in the relay only accelerate reads.

pub mod error;
pub mod sqlite;

use {
    async_trait::async_trait,
    hublink_common::types::{
        BlockWordRule, Connection, Hub, HubModerator, Infraction, InfractionKind,
        InfractionTarget, MessageAudit, ModeratorRole,
    },
};

pub use {
    error::{Error, Result},
    sqlite::{SqliteStore, connect},
};

/// Run database migrations for the store.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

#[async_trait]
pub trait HubStore: Send + Sync {
    async fn get_hub(&self, hub_id: &str) -> Result<Option<Hub>>;
    async fn find_hub_by_name(&self, name: &str) -> Result<Option<Hub>>;
    async fn create_hub(&self, hub: &Hub) -> Result<()>;
    /// Persist lock, settings, visibility, icon and alert webhook changes.
    async fn update_hub(&self, hub: &Hub) -> Result<()>;
    /// Delete a hub with its connections, moderators and block-word rules.
    /// Infractions and audit rows are kept.
    async fn delete_hub(&self, hub_id: &str) -> Result<bool>;
    async fn moderator_role(&self, hub_id: &str, user_id: &str) -> Result<Option<ModeratorRole>>;
    async fn add_moderator(&self, moderator: &HubModerator) -> Result<()>;
    async fn remove_moderator(&self, hub_id: &str, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(&self, channel_id: &str) -> Result<Option<Connection>>;
    /// Every connection of a hub, paused ones included.
    async fn list_connections(&self, hub_id: &str) -> Result<Vec<Connection>>;
    async fn upsert_connection(&self, connection: &Connection) -> Result<()>;
    async fn delete_connection(&self, channel_id: &str) -> Result<bool>;
    async fn set_connected(&self, channel_id: &str, connected: bool) -> Result<bool>;
    async fn touch_connection(&self, channel_id: &str, at_ms: i64) -> Result<()>;
}

#[async_trait]
pub trait InfractionStore: Send + Sync {
    /// Most recent infraction of `kind` that is active and unexpired at `now_ms`.
    async fn find_active(
        &self,
        hub_id: &str,
        target: &InfractionTarget,
        kind: InfractionKind,
        now_ms: i64,
    ) -> Result<Option<Infraction>>;
    async fn issue(&self, infraction: &Infraction) -> Result<()>;
    async fn revoke(&self, infraction_id: &str) -> Result<bool>;
    async fn list_for_target(
        &self,
        hub_id: &str,
        target: &InfractionTarget,
    ) -> Result<Vec<Infraction>>;
    /// Move active rows past their expiry to expired. Returns how many moved.
    async fn expire_due(&self, now_ms: i64) -> Result<u64>;
}

#[async_trait]
pub trait BlockWordStore: Send + Sync {
    async fn list_rules(&self, hub_id: &str) -> Result<Vec<BlockWordRule>>;
    /// Insert or replace a rule. New rules beyond `max_per_hub` fail with
    /// [`Error::RuleLimit`].
    async fn upsert_rule(&self, rule: &BlockWordRule, max_per_hub: usize) -> Result<()>;
    async fn delete_rule(&self, rule_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait MessageAuditStore: Send + Sync {
    async fn record_audit(&self, audit: &MessageAudit) -> Result<()>;
    async fn get_audit(&self, message_id: &str) -> Result<Option<MessageAudit>>;
}

/// Everything the relay needs from persistence.
pub trait Store:
    HubStore + ConnectionStore + InfractionStore + BlockWordStore + MessageAuditStore
{
}

impl<T> Store for T where
    T: HubStore + ConnectionStore + InfractionStore + BlockWordStore + MessageAuditStore
{
}
