//! Concurrent delivery to destination webhooks.
//!
//! Every destination is attempted once dispatch starts. Concurrency is
//! bounded and each attempt has its own timeout, so a slow endpoint never
//! holds back its siblings.

use std::{sync::Arc, time::Duration};

use {
    futures::{StreamExt, stream},
    hublink_common::types::{Connection, DisplayMode},
    hublink_webhook::{DeliveryError, DeliveryReceipt, FailureClass, WebhookPayload, WebhookSink},
    secrecy::ExposeSecret,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use {
    hublink_metrics::{counter, delivery as delivery_metrics, histogram, labels},
    std::time::Instant,
};

use crate::{
    index::{BroadcastCopy, ReplyLink},
    registry::ConnectionRegistry,
};

/// One rendered message bound for one destination.
#[derive(Clone)]
pub struct Delivery {
    pub connection: Connection,
    pub payload: WebhookPayload,
    pub reply: Option<ReplyLink>,
}

#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub channel_id: String,
    pub display_mode: DisplayMode,
    pub reply: Option<ReplyLink>,
    pub outcome: Result<DeliveryReceipt, DeliveryError>,
    /// Set when a permanent failure removed the connection.
    pub disabled: bool,
}

impl DeliveryResult {
    pub fn copy_of(&self, original_id: &str) -> Option<BroadcastCopy> {
        let receipt = self.outcome.as_ref().ok()?;
        Some(BroadcastCopy {
            message_id: receipt.message_id.clone(),
            channel_id: self.channel_id.clone(),
            original_id: original_id.to_string(),
            display_mode: self.display_mode,
            reply: self.reply.clone(),
        })
    }
}

/// Counts for a batch of edits or deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
}

pub struct BroadcastDispatcher {
    sink: Arc<dyn WebhookSink>,
    registry: Arc<ConnectionRegistry>,
    concurrency: usize,
    timeout: Duration,
}

#[cfg(feature = "metrics")]
fn outcome_label(outcome: &Result<(), &DeliveryError>) -> &'static str {
    match outcome {
        Ok(()) => "delivered",
        Err(e) => e.class().as_str(),
    }
}

impl BroadcastDispatcher {
    pub fn new(
        sink: Arc<dyn WebhookSink>,
        registry: Arc<ConnectionRegistry>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            sink,
            registry,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Deliver everything, returning one result per delivery ordered by
    /// channel id.
    pub async fn fan_out(&self, deliveries: Vec<Delivery>) -> Vec<DeliveryResult> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let mut results: Vec<DeliveryResult> = stream::iter(deliveries)
            .map(|delivery| self.deliver(delivery))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));

        #[cfg(feature = "metrics")]
        histogram!(delivery_metrics::FANOUT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        results
    }

    async fn deliver(&self, delivery: Delivery) -> DeliveryResult {
        let Delivery {
            connection,
            payload,
            reply,
        } = delivery;
        let channel_id = connection.channel_id.clone();
        let outcome = self
            .bounded(self.sink.execute(connection.webhook_url.expose_secret(), &payload))
            .await;

        #[cfg(feature = "metrics")]
        counter!(delivery_metrics::ATTEMPTS_TOTAL, labels::OUTCOME => outcome_label(&outcome.as_ref().map(|_| ())))
            .increment(1);

        let mut disabled = false;
        match &outcome {
            Ok(receipt) => {
                debug!(channel_id = %channel_id, copy_id = %receipt.message_id, "delivered");
            },
            Err(e) if e.class() == FailureClass::Permanent => {
                disabled = self.disable(&channel_id, e).await;
            },
            Err(e) => {
                debug!(channel_id = %channel_id, error = %e, "transient delivery failure");
            },
        }
        DeliveryResult {
            channel_id,
            display_mode: connection.display_mode,
            reply,
            outcome,
            disabled,
        }
    }

    async fn disable(&self, channel_id: &str, cause: &DeliveryError) -> bool {
        match self.registry.disable(channel_id).await {
            Ok(removed) => {
                if removed {
                    warn!(channel_id, error = %cause, "webhook rejected permanently, connection disabled");
                    #[cfg(feature = "metrics")]
                    counter!(delivery_metrics::CONNECTIONS_DISABLED_TOTAL).increment(1);
                }
                removed
            },
            Err(e) => {
                warn!(channel_id, error = %e, "could not disable connection after permanent failure");
                false
            },
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = hublink_webhook::Result<T>>,
    ) -> hublink_webhook::Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    async fn webhook_for(&self, copy: &BroadcastCopy) -> Option<String> {
        match self.registry.resolve(&copy.channel_id).await {
            Ok(Some(conn)) => Some(conn.webhook_url.expose_secret().clone()),
            Ok(None) => {
                debug!(channel_id = %copy.channel_id, "copy channel no longer connected");
                None
            },
            Err(e) => {
                warn!(channel_id = %copy.channel_id, error = %e, "could not resolve copy webhook");
                None
            },
        }
    }

    /// Edit every copy with the payload `build` returns for it.
    pub async fn edit_copies<F>(&self, copies: &[BroadcastCopy], build: F) -> BatchSummary
    where
        F: Fn(&BroadcastCopy) -> WebhookPayload + Sync,
    {
        let build = &build;
        let succeeded = stream::iter(copies.iter().cloned())
            .map(|copy| async move {
                let Some(url) = self.webhook_for(&copy).await else {
                    return false;
                };
                let payload = build(&copy);
                let outcome = self
                    .bounded(self.sink.edit_message(&url, &copy.message_id, &payload))
                    .await;
                self.log_secondary("edit", &copy, outcome.as_ref().map(|_| ()))
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<bool>>()
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        BatchSummary {
            attempted: copies.len(),
            succeeded,
        }
    }

    /// Delete every copy through its webhook.
    pub async fn delete_copies(&self, copies: &[BroadcastCopy]) -> BatchSummary {
        let succeeded = stream::iter(copies.iter().cloned())
            .map(|copy| async move {
                let Some(url) = self.webhook_for(&copy).await else {
                    return false;
                };
                let outcome = self
                    .bounded(self.sink.delete_message(&url, &copy.message_id))
                    .await;
                self.log_secondary("delete", &copy, outcome.as_ref().map(|_| ()))
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<bool>>()
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        BatchSummary {
            attempted: copies.len(),
            succeeded,
        }
    }

    fn log_secondary(
        &self,
        op: &'static str,
        copy: &BroadcastCopy,
        outcome: Result<(), &DeliveryError>,
    ) -> bool {
        #[cfg(feature = "metrics")]
        counter!(delivery_metrics::ATTEMPTS_TOTAL, labels::OUTCOME => outcome_label(&outcome), "op" => op)
            .increment(1);
        match outcome {
            Ok(()) => true,
            Err(e) => {
                debug!(op, channel_id = %copy.channel_id, copy_id = %copy.message_id, error = %e, "copy update failed");
                false
            },
        }
    }
}
