// ── Runtime sync configuration ──
//
// Describes how the synchronization loop fetches state. Built by the
// CLI (or any embedder) and handed in; core never reads config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How each tick refreshes a replica.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch a full status snapshot every tick.
    Status,
    /// Catch up on the event log from the last applied event.
    #[default]
    Events,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Self::Status),
            "events" => Ok(Self::Events),
            other => Err(CoreError::Config {
                message: format!("unknown sync mode '{other}' (expected 'status' or 'events')"),
            }),
        }
    }
}

/// Configuration for one synchronization loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub mode: SyncMode,
    /// Time between tick starts.
    pub interval: Duration,
    /// Deadline for a whole tick, retries and backoff included.
    pub tick_timeout: Duration,
    /// Appliances to mirror. Empty means discover them from the account.
    pub serials: Vec<String>,
    /// Offset used when rendering timestamps for humans.
    pub display_offset: FixedOffset,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            interval: Duration::from_secs(30),
            tick_timeout: Duration::from_secs(120),
            serials: Vec::new(),
            display_offset: Utc.fix(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::Config {
                message: "sync interval must be greater than zero".into(),
            });
        }
        if self.tick_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "tick timeout must be greater than zero".into(),
            });
        }
        if let Some(blank) = self.serials.iter().find(|s| s.trim().is_empty()) {
            return Err(CoreError::Config {
                message: format!("invalid serial {blank:?}"),
            });
        }
        Ok(())
    }
}
