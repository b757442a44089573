use crate::domain::value_objects::RemoteId;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: RemoteId,
    pub data: Value,
}

/// Document CRUD over one named remote collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn collection(&self) -> &str;
    async fn add(&self, document: Value) -> Result<RemoteId, AppError>;
    /// Fails with `NotFound` when the document no longer exists.
    async fn update(&self, id: &RemoteId, document: Value) -> Result<(), AppError>;
    async fn delete(&self, id: &RemoteId) -> Result<(), AppError>;
    async fn list(&self) -> Result<Vec<RemoteDocument>, AppError>;
}
