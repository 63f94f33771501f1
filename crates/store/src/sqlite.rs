use std::str::FromStr;

use {
    async_trait::async_trait,
    hublink_common::types::{
        BlockWordAction, BlockWordRule, Connection, DisplayMode, Hub, HubModerator, HubSettings,
        Infraction, InfractionKind, InfractionStatus, InfractionTarget, MessageAudit,
        ModeratorRole, TargetKind,
    },
    secrecy::{ExposeSecret, Secret},
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::debug,
};

use crate::{
    BlockWordStore, ConnectionStore, HubStore, InfractionStore, MessageAuditStore,
    error::{Context, Error, Result},
};

/// Open a pool for `url`, creating the database file if needed.
///
/// In-memory databases are pinned to one long-lived connection, since every
/// SQLite connection to `:memory:` sees its own database.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };
    Ok(pool.connect_with(options).await?)
}

// ── Row types ───────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct HubRow {
    id: String,
    name: String,
    owner_id: String,
    private: bool,
    locked: bool,
    settings: i64,
    icon_url: Option<String>,
    alert_webhook: Option<String>,
    created_at: i64,
}

impl TryFrom<HubRow> for Hub {
    type Error = Error;

    fn try_from(r: HubRow) -> Result<Self> {
        let bits = u32::try_from(r.settings)
            .with_context(|| format!("hub {} has invalid settings {}", r.id, r.settings))?;
        Ok(Self {
            id: r.id,
            name: r.name,
            owner_id: r.owner_id,
            private: r.private,
            locked: r.locked,
            settings: HubSettings::from_bits_truncate(bits),
            icon_url: r.icon_url,
            alert_webhook: r.alert_webhook.map(Secret::new),
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    channel_id: String,
    hub_id: String,
    server_id: String,
    webhook_url: String,
    connected: bool,
    display_mode: String,
    profanity_filter: bool,
    last_active_at: i64,
    created_at: i64,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = Error;

    fn try_from(r: ConnectionRow) -> Result<Self> {
        Ok(Self {
            display_mode: r.display_mode.parse::<DisplayMode>()?,
            channel_id: r.channel_id,
            hub_id: r.hub_id,
            server_id: r.server_id,
            webhook_url: Secret::new(r.webhook_url),
            connected: r.connected,
            profanity_filter: r.profanity_filter,
            last_active_at: r.last_active_at,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InfractionRow {
    id: String,
    hub_id: String,
    target_kind: String,
    target_id: String,
    kind: String,
    reason: String,
    moderator_id: String,
    issued_at: i64,
    expires_at: Option<i64>,
    status: String,
}

impl TryFrom<InfractionRow> for Infraction {
    type Error = Error;

    fn try_from(r: InfractionRow) -> Result<Self> {
        Ok(Self {
            target: InfractionTarget::new(r.target_kind.parse::<TargetKind>()?, r.target_id),
            kind: r.kind.parse::<InfractionKind>()?,
            status: r.status.parse::<InfractionStatus>()?,
            id: r.id,
            hub_id: r.hub_id,
            reason: r.reason,
            moderator_id: r.moderator_id,
            issued_at: r.issued_at,
            expires_at: r.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BlockWordRow {
    id: String,
    hub_id: String,
    name: String,
    words: String,
    actions: String,
    created_at: i64,
}

impl TryFrom<BlockWordRow> for BlockWordRule {
    type Error = Error;

    fn try_from(r: BlockWordRow) -> Result<Self> {
        Ok(Self {
            words: serde_json::from_str(&r.words)?,
            actions: serde_json::from_str::<Vec<BlockWordAction>>(&r.actions)?,
            id: r.id,
            hub_id: r.hub_id,
            name: r.name,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    message_id: String,
    hub_id: String,
    author_id: String,
    server_id: String,
    channel_id: String,
    created_at: i64,
    copy_count: i64,
}

impl From<AuditRow> for MessageAudit {
    fn from(r: AuditRow) -> Self {
        Self {
            message_id: r.message_id,
            hub_id: r.hub_id,
            author_id: r.author_id,
            server_id: r.server_id,
            channel_id: r.channel_id,
            created_at: r.created_at,
            copy_count: u32::try_from(r.copy_count).unwrap_or(u32::MAX),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fresh migrated in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = connect("sqlite::memory:", 1).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl HubStore for SqliteStore {
    async fn get_hub(&self, hub_id: &str) -> Result<Option<Hub>> {
        let row = sqlx::query_as::<_, HubRow>("SELECT * FROM hubs WHERE id = ?")
            .bind(hub_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_hub_by_name(&self, name: &str) -> Result<Option<Hub>> {
        let row = sqlx::query_as::<_, HubRow>("SELECT * FROM hubs WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_hub(&self, hub: &Hub) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO hubs
                 (id, name, owner_id, private, locked, settings, icon_url, alert_webhook, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&hub.id)
        .bind(&hub.name)
        .bind(&hub.owner_id)
        .bind(hub.private)
        .bind(hub.locked)
        .bind(i64::from(hub.settings.bits()))
        .bind(hub.icon_url.as_deref())
        .bind(hub.alert_webhook.as_ref().map(|w| w.expose_secret().as_str()))
        .bind(hub.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_hub(&self, hub: &Hub) -> Result<()> {
        sqlx::query(
            r#"UPDATE hubs SET
                 name = ?, private = ?, locked = ?, settings = ?, icon_url = ?, alert_webhook = ?
               WHERE id = ?"#,
        )
        .bind(&hub.name)
        .bind(hub.private)
        .bind(hub.locked)
        .bind(i64::from(hub.settings.bits()))
        .bind(hub.icon_url.as_deref())
        .bind(hub.alert_webhook.as_ref().map(|w| w.expose_secret().as_str()))
        .bind(&hub.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_hub(&self, hub_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        for table in ["connections", "block_word_rules", "hub_moderators"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE hub_id = ?"))
                .bind(hub_id)
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM hubs WHERE id = ?")
            .bind(hub_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        debug!(hub_id, deleted, "deleted hub");
        Ok(deleted > 0)
    }

    async fn moderator_role(&self, hub_id: &str, user_id: &str) -> Result<Option<ModeratorRole>> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM hub_moderators WHERE hub_id = ? AND user_id = ?",
        )
        .bind(hub_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role.map(|r| r.parse::<ModeratorRole>()).transpose()?)
    }

    async fn add_moderator(&self, moderator: &HubModerator) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO hub_moderators (hub_id, user_id, role) VALUES (?, ?, ?)
               ON CONFLICT(hub_id, user_id) DO UPDATE SET role = excluded.role"#,
        )
        .bind(&moderator.hub_id)
        .bind(&moderator.user_id)
        .bind(moderator.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_moderator(&self, hub_id: &str, user_id: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM hub_moderators WHERE hub_id = ? AND user_id = ?")
            .bind(hub_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn get_connection(&self, channel_id: &str) -> Result<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>("SELECT * FROM connections WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_connections(&self, hub_id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            "SELECT * FROM connections WHERE hub_id = ? ORDER BY created_at",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_connection(&self, c: &Connection) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO connections
                 (channel_id, hub_id, server_id, webhook_url, connected, display_mode,
                  profanity_filter, last_active_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(channel_id) DO UPDATE SET
                 hub_id = excluded.hub_id,
                 server_id = excluded.server_id,
                 webhook_url = excluded.webhook_url,
                 connected = excluded.connected,
                 display_mode = excluded.display_mode,
                 profanity_filter = excluded.profanity_filter,
                 last_active_at = excluded.last_active_at"#,
        )
        .bind(&c.channel_id)
        .bind(&c.hub_id)
        .bind(&c.server_id)
        .bind(c.webhook_url.expose_secret().as_str())
        .bind(c.connected)
        .bind(c.display_mode.as_str())
        .bind(c.profanity_filter)
        .bind(c.last_active_at)
        .bind(c.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_connection(&self, channel_id: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM connections WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn set_connected(&self, channel_id: &str, connected: bool) -> Result<bool> {
        let updated = sqlx::query("UPDATE connections SET connected = ? WHERE channel_id = ?")
            .bind(connected)
            .bind(channel_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    async fn touch_connection(&self, channel_id: &str, at_ms: i64) -> Result<()> {
        sqlx::query("UPDATE connections SET last_active_at = ? WHERE channel_id = ?")
            .bind(at_ms)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl InfractionStore for SqliteStore {
    async fn find_active(
        &self,
        hub_id: &str,
        target: &InfractionTarget,
        kind: InfractionKind,
        now_ms: i64,
    ) -> Result<Option<Infraction>> {
        let row = sqlx::query_as::<_, InfractionRow>(
            r#"SELECT * FROM infractions
               WHERE hub_id = ? AND target_kind = ? AND target_id = ? AND kind = ?
                 AND status = 'active' AND (expires_at IS NULL OR expires_at > ?)
               ORDER BY issued_at DESC
               LIMIT 1"#,
        )
        .bind(hub_id)
        .bind(target.kind().as_str())
        .bind(target.id())
        .bind(kind.as_str())
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn issue(&self, i: &Infraction) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO infractions
                 (id, hub_id, target_kind, target_id, kind, reason, moderator_id,
                  issued_at, expires_at, status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&i.id)
        .bind(&i.hub_id)
        .bind(i.target.kind().as_str())
        .bind(i.target.id())
        .bind(i.kind.as_str())
        .bind(&i.reason)
        .bind(&i.moderator_id)
        .bind(i.issued_at)
        .bind(i.expires_at)
        .bind(i.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(&self, infraction_id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE infractions SET status = 'revoked' WHERE id = ? AND status = 'active'",
        )
        .bind(infraction_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn list_for_target(
        &self,
        hub_id: &str,
        target: &InfractionTarget,
    ) -> Result<Vec<Infraction>> {
        let rows = sqlx::query_as::<_, InfractionRow>(
            r#"SELECT * FROM infractions
               WHERE hub_id = ? AND target_kind = ? AND target_id = ?
               ORDER BY issued_at DESC"#,
        )
        .bind(hub_id)
        .bind(target.kind().as_str())
        .bind(target.id())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn expire_due(&self, now_ms: i64) -> Result<u64> {
        let moved = sqlx::query(
            r#"UPDATE infractions SET status = 'expired'
               WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?"#,
        )
        .bind(now_ms)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(moved)
    }
}

#[async_trait]
impl BlockWordStore for SqliteStore {
    async fn list_rules(&self, hub_id: &str) -> Result<Vec<BlockWordRule>> {
        let rows = sqlx::query_as::<_, BlockWordRow>(
            "SELECT * FROM block_word_rules WHERE hub_id = ? ORDER BY created_at, name",
        )
        .bind(hub_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_rule(&self, rule: &BlockWordRule, max_per_hub: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM block_word_rules WHERE id = ?")
            .bind(&rule.id)
            .fetch_one(&mut *tx)
            .await?
            > 0;
        if !exists {
            let count =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM block_word_rules WHERE hub_id = ?")
                    .bind(&rule.hub_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if usize::try_from(count).unwrap_or(usize::MAX) >= max_per_hub {
                return Err(Error::RuleLimit {
                    hub_id: rule.hub_id.clone(),
                    max: max_per_hub,
                });
            }
        }

        sqlx::query(
            r#"INSERT INTO block_word_rules (id, hub_id, name, words, actions, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 words = excluded.words,
                 actions = excluded.actions"#,
        )
        .bind(&rule.id)
        .bind(&rule.hub_id)
        .bind(&rule.name)
        .bind(serde_json::to_string(&rule.words)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .bind(rule.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_rule(&self, rule_id: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM block_word_rules WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

#[async_trait]
impl MessageAuditStore for SqliteStore {
    async fn record_audit(&self, a: &MessageAudit) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO message_audit
                 (message_id, hub_id, author_id, server_id, channel_id, created_at, copy_count)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(message_id) DO UPDATE SET copy_count = excluded.copy_count"#,
        )
        .bind(&a.message_id)
        .bind(&a.hub_id)
        .bind(&a.author_id)
        .bind(&a.server_id)
        .bind(&a.channel_id)
        .bind(a.created_at)
        .bind(i64::from(a.copy_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_audit(&self, message_id: &str) -> Result<Option<MessageAudit>> {
        let row = sqlx::query_as::<_, AuditRow>("SELECT * FROM message_audit WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }
}
