use super::STATE_CHANNEL_CAPACITY;
use crate::application::ports::network_monitor::NetworkMonitor;
use crate::domain::value_objects::NetworkState;
use crate::shared::config::NetworkConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Derives connectivity from TCP connects to a well-known endpoint.
pub struct ProbeNetworkMonitor {
    address: String,
    interval: Duration,
    timeout: Duration,
    sender: broadcast::Sender<NetworkState>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ProbeNetworkMonitor {
    pub fn new(address: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            address: address.into(),
            interval,
            timeout,
            sender,
            poller: Mutex::new(None),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.probe_address.clone(),
            config.probe_interval(),
            config.probe_timeout(),
        )
    }

    /// Starts publishing a reading every interval. Restarts the poller if running.
    pub fn start(&self) {
        let address = self.address.clone();
        let interval = self.interval;
        let timeout = self.timeout;
        let sender = self.sender.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let state = probe(&address, timeout).await;
                // No subscribers is fine; the next tick publishes again.
                let _ = sender.send(state);
            }
        });

        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = poller.replace(handle) {
            previous.abort();
        }
        tracing::info!(
            target: "sync::network",
            address = %self.address,
            interval_ms = saturating_millis(interval),
            "network probe started"
        );
    }

    pub fn stop(&self) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = poller.take() {
            handle.abort();
            tracing::info!(target: "sync::network", "network probe stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ProbeNetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn probe(address: &str, timeout: Duration) -> NetworkState {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => NetworkState::online(),
        Ok(Err(err)) => {
            tracing::debug!(target: "sync::network", address, error = %err, "probe connect failed");
            NetworkState::offline()
        }
        Err(_) => {
            tracing::debug!(target: "sync::network", address, "probe timed out");
            NetworkState::offline()
        }
    }
}

#[async_trait]
impl NetworkMonitor for ProbeNetworkMonitor {
    async fn fetch_once(&self) -> Result<NetworkState, AppError> {
        Ok(probe(&self.address, self.timeout).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.sender.subscribe()
    }
}
