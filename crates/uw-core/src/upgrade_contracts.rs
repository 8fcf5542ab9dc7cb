use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Pending upgrade as reported by a node's `current_plan` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradePlan {
    pub name: String,
    #[serde(deserialize_with = "deserialize_height")]
    pub height: u64,
    #[serde(default)]
    pub info: String,
}

impl UpgradePlan {
    pub fn new(name: impl Into<String>, height: u64) -> Self {
        Self {
            name: name.into(),
            height,
            info: String::new(),
        }
    }
}

/// Cosmos nodes encode int64 fields as JSON strings; accept both forms.
fn deserialize_height<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("height must be a non-negative integer")),
        _ => Err(serde::de::Error::custom(
            "expected string or number for height",
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanParseError {
    #[error("response has no plan field")]
    PlanFieldMissing,
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

/// Parses the body of `/cosmos/upgrade/v1beta1/current_plan`.
///
/// A `plan` that is `null`, an empty object, or the zero-valued plan some nodes return
/// (blank `name`) means no upgrade is scheduled and yields `Ok(None)`. A body without the `plan` key is a different condition and is reported as
/// [`PlanParseError::PlanFieldMissing`].
pub fn parse_current_plan(body: &str) -> Result<Option<UpgradePlan>, PlanParseError> {
    let value: Value = serde_json::from_str(body).map_err(|_| PlanParseError::PlanFieldMissing)?;
    let Some(plan) = value.as_object().and_then(|obj| obj.get("plan")) else {
        return Err(PlanParseError::PlanFieldMissing);
    };

    match plan {
        Value::Null => Ok(None),
        Value::Object(fields) if fields.is_empty() => Ok(None),
        other => {
            let plan = UpgradePlan::deserialize(other)
                .map_err(|err| PlanParseError::InvalidPlan(err.to_string()))?;
            // The upgrade module refuses plans without a name, so a blank one is a default value.
            if plan.name.trim().is_empty() {
                return Ok(None);
            }
            Ok(Some(plan))
        }
    }
}

/// Label values for the `errors` counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WatchErrorKind {
    PlanNotInRequest,
    UpgradeRequestFailed,
    DatabaseUpdateFailed,
    DatabaseReadFailed,
    NotificationFailed,
}

impl WatchErrorKind {
    pub const ALL: [WatchErrorKind; 5] = [
        Self::PlanNotInRequest,
        Self::UpgradeRequestFailed,
        Self::DatabaseUpdateFailed,
        Self::DatabaseReadFailed,
        Self::NotificationFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanNotInRequest => "plan_not_in_request",
            Self::UpgradeRequestFailed => "upgrade_request_failed",
            Self::DatabaseUpdateFailed => "database_update_failed",
            Self::DatabaseReadFailed => "database_read_failed",
            Self::NotificationFailed => "notification_failed",
        }
    }
}

impl fmt::Display for WatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message sent when a chain announces an upgrade that has not been notified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeAlert<'a> {
    pub chain_id: &'a str,
    pub plan: &'a UpgradePlan,
}

impl<'a> UpgradeAlert<'a> {
    pub fn new(chain_id: &'a str, plan: &'a UpgradePlan) -> Self {
        Self { chain_id, plan }
    }

    pub fn text(&self) -> String {
        format!(
            "{} upgrade at block height {}",
            self.chain_id, self.plan.height
        )
    }

    /// Slack incoming-webhook body: fallback text plus a header and a field section.
    pub fn slack_payload(&self) -> Value {
        let mut fields = vec![
            json!({ "type": "mrkdwn", "text": format!("Name\n`{}`", self.plan.name) }),
            json!({ "type": "mrkdwn", "text": format!("Height\n`{}`", self.plan.height) }),
        ];
        if !self.plan.info.is_empty() {
            fields.push(json!({ "type": "mrkdwn", "text": format!("Info\n{}", self.plan.info) }));
        }

        json!({
            "text": self.text(),
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": format!("New chain upgrade in {}", self.chain_id),
                        "emoji": false,
                    },
                },
                {
                    "type": "section",
                    "fields": fields,
                },
            ],
        })
    }
}
