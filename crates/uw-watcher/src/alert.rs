use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uw_core::{UpgradeAlert, UpgradePlan};

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook rejected alert with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, chain_id: &str, plan: &UpgradePlan) -> Result<(), AlertError>;
}

/// Slack incoming webhook.
#[derive(Clone)]
pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for SlackWebhook {
    async fn notify(&self, chain_id: &str, plan: &UpgradePlan) -> Result<(), AlertError> {
        let payload = UpgradeAlert::new(chain_id, plan).slack_payload();
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
