use crate::domain::value_objects::NetworkState;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::broadcast;

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn fetch_once(&self) -> Result<NetworkState, AppError>;
    /// Every refresh is delivered, whether or not the state changed.
    fn subscribe(&self) -> broadcast::Receiver<NetworkState>;
}
