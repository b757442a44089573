use serde::{Deserialize, Serialize};

/// One connectivity reading from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub connected: bool,
    /// `None` while the platform has not determined reachability yet.
    pub internet_reachable: Option<bool>,
}

impl NetworkState {
    pub const fn online() -> Self {
        Self {
            connected: true,
            internet_reachable: Some(true),
        }
    }

    pub const fn offline() -> Self {
        Self {
            connected: false,
            internet_reachable: Some(false),
        }
    }

    /// Unknown reachability counts as online.
    pub fn is_online(&self) -> bool {
        self.connected && self.internet_reachable != Some(false)
    }
}
