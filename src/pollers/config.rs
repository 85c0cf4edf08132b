use crate::error::{ReconcileError, Result};
use crate::utils::parse_day;
use chrono::NaiveDate;
use std::path::PathBuf;

pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
pub const DEFAULT_POLL_SINCE: &str = "2020-01-01";

/// Credentials and locations for a polling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub stripe_api_key: Option<String>,
    pub monday_api_key: Option<String>,
    pub monday_board_id: Option<String>,
    /// Only items of this board group are read. `None` reads every group.
    pub monday_board_group: Option<String>,
    pub snapshot_dir: PathBuf,
    /// Earliest creation/cancellation day kept from the payments provider.
    pub since: NaiveDate,
}

impl PollerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name → value lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let since = match get("POLL_SINCE") {
            Some(value) => parse_day(&value)?,
            None => parse_day(DEFAULT_POLL_SINCE)?,
        };

        Ok(Self {
            stripe_api_key: get("STRIPE_API_KEY"),
            monday_api_key: get("MONDAY_API_KEY"),
            monday_board_id: get("MONDAY_BOARD_ID"),
            monday_board_group: get("MONDAY_BOARD_GROUP"),
            snapshot_dir: get("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            since,
        })
    }

    pub fn stripe_api_key(&self) -> Result<&str> {
        required(&self.stripe_api_key, "STRIPE_API_KEY")
    }

    pub fn monday_api_key(&self) -> Result<&str> {
        required(&self.monday_api_key, "MONDAY_API_KEY")
    }

    pub fn monday_board_id(&self) -> Result<&str> {
        required(&self.monday_board_id, "MONDAY_BOARD_ID")
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| ReconcileError::MissingConfig(name.to_string()))
}
