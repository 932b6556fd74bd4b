use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

/// loan book configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// active loans due within this many days count as upcoming
    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_window_days: u32,
    /// payments listed under recent transactions on the dashboard
    #[serde(default = "default_recent_transactions_limit")]
    pub recent_transactions_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            upcoming_window_days: default_upcoming_window_days(),
            recent_transactions_limit: default_recent_transactions_limit(),
        }
    }
}

impl LedgerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LedgerError::validation("config", e.to_string()))
    }

    pub fn upcoming_window(&self) -> Duration {
        Duration::days(i64::from(self.upcoming_window_days))
    }
}

fn default_upcoming_window_days() -> u32 {
    7
}

fn default_recent_transactions_limit() -> usize {
    5
}
