use std::sync::Arc;

use {
    hublink_cache::InMemoryCache,
    hublink_config::HublinkConfig,
    hublink_relay::{LoggingHooks, Relay},
    hublink_store::SqliteStore,
    hublink_webhook::HttpWebhookSink,
};

/// Open the configured database with migrations applied.
pub async fn open_store(config: &HublinkConfig) -> anyhow::Result<SqliteStore> {
    let pool = hublink_store::connect(&config.database.url, config.database.max_connections).await?;
    hublink_store::run_migrations(&pool).await?;
    Ok(SqliteStore::new(pool))
}

/// A relay over the configured database, for one-shot administrative
/// commands. The cache is process-local and starts empty.
pub async fn open_relay(config: &HublinkConfig) -> anyhow::Result<Relay> {
    let store = Arc::new(open_store(config).await?);
    Ok(Relay::new(
        config,
        store,
        Arc::new(InMemoryCache::new()),
        Arc::new(HttpWebhookSink::new()?),
        Arc::new(LoggingHooks),
    ))
}

pub async fn migrate(config: &HublinkConfig) -> anyhow::Result<()> {
    let pool = hublink_store::connect(&config.database.url, 1).await?;
    hublink_store::run_migrations(&pool).await?;
    pool.close().await;
    println!("Migrations applied to {}", config.database.url);
    Ok(())
}

pub async fn sweep(config: &HublinkConfig) -> anyhow::Result<()> {
    let relay = open_relay(config).await?;
    let expired = relay.sweep_infractions().await?;
    println!("Expired {expired} infraction(s).");
    Ok(())
}
