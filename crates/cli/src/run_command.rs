use std::{path::Path, sync::Arc, time::Duration};

use {
    hublink_cache::InMemoryCache,
    hublink_config::HublinkConfig,
    hublink_relay::{InboundEvent, LoggingHooks, Relay},
    hublink_webhook::HttpWebhookSink,
    tokio::io::{AsyncBufReadExt, AsyncRead, BufReader},
    tracing::{debug, error, info, warn},
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(config: &HublinkConfig, input: Option<&Path>) -> anyhow::Result<()> {
    #[cfg(feature = "metrics")]
    let _metrics = hublink_metrics::init_metrics(hublink_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen: config
            .metrics
            .listen
            .as_deref()
            .map(str::parse::<std::net::SocketAddr>)
            .transpose()?,
        global_labels: Vec::new(),
    })?;

    let store = Arc::new(crate::db_commands::open_store(config).await?);
    let relay = Relay::new(
        config,
        store,
        Arc::new(InMemoryCache::new()),
        Arc::new(HttpWebhookSink::new()?),
        Arc::new(LoggingHooks),
    );

    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => Box::new(tokio::fs::File::open(path).await?),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    info!("relay ready, reading events");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                handle_line(&relay, &line).await;
            },
            _ = sweep.tick() => {
                if let Err(e) = relay.sweep_infractions().await {
                    warn!(error = %e, "infraction sweep failed");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            },
        }
    }

    relay.drain_side_effects().await;
    info!("relay stopped");
    Ok(())
}

async fn handle_line(relay: &Relay, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let event: InboundEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "skipping undecodable event");
            return;
        },
    };
    match relay.handle_event(&event).await {
        Ok(outcome) => debug!(?outcome, "event handled"),
        Err(e) => error!(error = %e, "event failed"),
    }
}
