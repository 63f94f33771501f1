use std::time::Duration;

use {
    async_trait::async_trait,
    serde::Deserialize,
    tracing::debug,
    url::Url,
};

use crate::{DeliveryError, DeliveryReceipt, Result, WebhookPayload, WebhookSink};

/// Fields we read back from `?wait=true` executions.
#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// [`WebhookSink`] over HTTP.
#[derive(Clone)]
pub struct HttpWebhookSink {
    http: reqwest::Client,
}

impl HttpWebhookSink {
    /// Client with a connect timeout. Overall request time is bounded by the
    /// caller.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("hublink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn parse_url(webhook_url: &str) -> Result<Url> {
    Url::parse(webhook_url).map_err(|e| DeliveryError::InvalidUrl {
        message: e.to_string(),
    })
}

/// `{webhook}/messages/{id}`, keeping any query such as a thread id.
fn message_url(webhook_url: &str, message_id: &str) -> Result<Url> {
    let mut url = parse_url(webhook_url)?;
    url.path_segments_mut()
        .map_err(|()| DeliveryError::InvalidUrl {
            message: format!("{webhook_url} cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(["messages", message_id]);
    Ok(url)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DeliveryError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn execute(&self, webhook_url: &str, payload: &WebhookPayload) -> Result<DeliveryReceipt> {
        let mut url = parse_url(webhook_url)?;
        url.query_pairs_mut().append_pair("wait", "true");

        let resp = self.http.post(url).json(payload).send().await?;
        let created: CreatedMessage = ensure_success(resp).await?.json().await?;
        debug!(message_id = %created.id, "webhook message created");
        Ok(DeliveryReceipt {
            message_id: created.id,
            timestamp: created.timestamp,
        })
    }

    async fn edit_message(
        &self,
        webhook_url: &str,
        message_id: &str,
        payload: &WebhookPayload,
    ) -> Result<()> {
        let url = message_url(webhook_url, message_id)?;
        let resp = self.http.patch(url).json(payload).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn delete_message(&self, webhook_url: &str, message_id: &str) -> Result<()> {
        let url = message_url(webhook_url, message_id)?;
        let resp = self.http.delete(url).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
