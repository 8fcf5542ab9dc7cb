pub mod config;
pub mod upgrade_contracts;

pub use config::{ChainConfig, ConfigError, SlackConfig, WatcherConfig};
pub use upgrade_contracts::{
    parse_current_plan, PlanParseError, UpgradeAlert, UpgradePlan, WatchErrorKind,
};
