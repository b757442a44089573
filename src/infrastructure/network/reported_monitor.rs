use super::STATE_CHANNEL_CAPACITY;
use crate::application::ports::network_monitor::NetworkMonitor;
use crate::domain::value_objects::NetworkState;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

/// Connectivity pushed in by the host platform.
pub struct ReportedNetworkMonitor {
    state: RwLock<NetworkState>,
    sender: broadcast::Sender<NetworkState>,
}

impl ReportedNetworkMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (sender, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(initial),
            sender,
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online())
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::offline())
    }

    /// Stores the reading and publishes it to every subscriber.
    pub async fn report(&self, state: NetworkState) {
        *self.state.write().await = state;
        if self.sender.send(state).is_err() {
            tracing::trace!(target: "sync::network", "network state reported without subscribers");
        }
    }

    pub async fn current(&self) -> NetworkState {
        *self.state.read().await
    }
}

#[async_trait]
impl NetworkMonitor for ReportedNetworkMonitor {
    async fn fetch_once(&self) -> Result<NetworkState, AppError> {
        Ok(self.current().await)
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.sender.subscribe()
    }
}
