use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pending intent of a record relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Created,
    Updated,
    Deleted,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Created => "created",
            SyncStatus::Updated => "updated",
            SyncStatus::Deleted => "deleted",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(SyncStatus::Created),
            "updated" => Ok(SyncStatus::Updated),
            "deleted" => Ok(SyncStatus::Deleted),
            "synced" => Ok(SyncStatus::Synced),
            other => Err(format!("Unknown sync status: {other}")),
        }
    }
}
