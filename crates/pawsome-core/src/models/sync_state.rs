//! Local sync state of a cached post

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a locally cached post is known to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Mirrors a committed remote record
    #[default]
    Synced,
    /// Stored locally only, waiting for connectivity
    Pending,
    /// Rejected by the remote store; needs user action
    Failed,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }

    /// True for records the remote store does not know about.
    #[must_use]
    pub const fn is_local_only(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync state '{other}'")),
        }
    }
}
