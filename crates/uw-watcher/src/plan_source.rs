use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uw_core::{parse_current_plan, PlanParseError, UpgradePlan, WatchErrorKind};

pub const CURRENT_PLAN_PATH: &str = "/cosmos/upgrade/v1beta1/current_plan";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanSourceError {
    /// Transport failure (`status` is `None`) or a non-200 response.
    #[error("upgrade plan request failed (status {status:?}): {body}")]
    RequestFailed { status: Option<u16>, body: String },
    #[error("request successful, but no plan object in response")]
    PlanFieldMissing,
    #[error("request successful, but plan is malformed: {0}")]
    InvalidPlan(String),
}

impl PlanSourceError {
    pub fn kind(&self) -> WatchErrorKind {
        match self {
            Self::RequestFailed { .. } => WatchErrorKind::UpgradeRequestFailed,
            Self::PlanFieldMissing | Self::InvalidPlan(_) => WatchErrorKind::PlanNotInRequest,
        }
    }
}

impl From<PlanParseError> for PlanSourceError {
    fn from(err: PlanParseError) -> Self {
        match err {
            PlanParseError::PlanFieldMissing => Self::PlanFieldMissing,
            PlanParseError::InvalidPlan(message) => Self::InvalidPlan(message),
        }
    }
}

/// Where a watcher reads a chain's pending upgrade from. `Ok(None)` means the node
/// reports no scheduled upgrade.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn fetch_plan(&self, endpoint: &str) -> Result<Option<UpgradePlan>, PlanSourceError>;
}

pub fn current_plan_url(endpoint: &str) -> String {
    format!("{}{CURRENT_PLAN_PATH}", endpoint.trim_end_matches('/'))
}

/// Cosmos SDK REST (LCD) plan source.
#[derive(Clone)]
pub struct HttpPlanSource {
    client: reqwest::Client,
}

impl HttpPlanSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlanSource for HttpPlanSource {
    async fn fetch_plan(&self, endpoint: &str) -> Result<Option<UpgradePlan>, PlanSourceError> {
        let url = current_plan_url(endpoint);
        debug!(event = "plan_fetch", url = %url);

        let response = self.client.get(&url).send().await.map_err(|err| {
            PlanSourceError::RequestFailed {
                status: None,
                body: err.to_string(),
            }
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| PlanSourceError::RequestFailed {
                status: Some(status.as_u16()),
                body: err.to_string(),
            })?;

        if status != StatusCode::OK {
            return Err(PlanSourceError::RequestFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(parse_current_plan(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_endpoint_and_path() {
        assert_eq!(
            current_plan_url("http://localhost:1317"),
            "http://localhost:1317/cosmos/upgrade/v1beta1/current_plan"
        );
        assert_eq!(
            current_plan_url("http://localhost:1317/"),
            "http://localhost:1317/cosmos/upgrade/v1beta1/current_plan"
        );
    }

    #[test]
    fn errors_map_to_counter_labels() {
        let failed = PlanSourceError::RequestFailed {
            status: Some(500),
            body: "boom".to_string(),
        };
        assert_eq!(failed.kind().as_str(), "upgrade_request_failed");
        assert_eq!(
            PlanSourceError::PlanFieldMissing.kind().as_str(),
            "plan_not_in_request"
        );
        assert_eq!(
            PlanSourceError::InvalidPlan("bad height".to_string())
                .kind()
                .as_str(),
            "plan_not_in_request"
        );
    }
}
