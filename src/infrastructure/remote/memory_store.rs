use crate::application::ports::remote_store::{RemoteDocument, RemoteStore};
use crate::domain::value_objects::RemoteId;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Most recent delete calls kept by `deleted_ids`.
const DELETED_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCallStats {
    pub adds: u64,
    pub updates: u64,
    pub deletes: u64,
    pub lists: u64,
}

/// In-process document collection.
///
/// Can be switched unavailable and slowed down to exercise the sync paths.
/// Documents written through `insert_document`/`remove_document` stand in for
/// other clients and are not counted in the call stats.
pub struct MemoryRemoteStore {
    collection: String,
    documents: RwLock<BTreeMap<String, Value>>,
    deleted: RwLock<VecDeque<RemoteId>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
    next_id: AtomicU64,
    adds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    lists: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            documents: RwLock::new(BTreeMap::new()),
            deleted: RwLock::new(VecDeque::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            adds: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            lists: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn insert_document(&self, data: Value) -> Result<RemoteId, AppError> {
        let id = self.allocate_id()?;
        self.documents
            .write()
            .await
            .insert(id.as_str().to_string(), data);
        Ok(id)
    }

    pub async fn remove_document(&self, id: &RemoteId) -> bool {
        self.documents.write().await.remove(id.as_str()).is_some()
    }

    pub async fn document(&self, id: &RemoteId) -> Option<Value> {
        self.documents.read().await.get(id.as_str()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Ids passed to `delete`, oldest first, bounded to the latest calls.
    pub async fn deleted_ids(&self) -> Vec<RemoteId> {
        self.deleted.read().await.iter().cloned().collect()
    }

    pub fn stats(&self) -> RemoteCallStats {
        RemoteCallStats {
            adds: self.adds.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
        }
    }

    fn allocate_id(&self) -> Result<RemoteId, AppError> {
        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Zero padding keeps BTreeMap order equal to insertion order.
        RemoteId::new(format!("{}-{sequence:08}", self.collection.to_lowercase()))
            .map_err(AppError::Internal)
    }

    async fn simulate_transport(&self) -> Result<(), AppError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AppError::RemoteUnavailable(format!(
                "collection {} is unreachable",
                self.collection
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, document: Value) -> Result<RemoteId, AppError> {
        self.simulate_transport().await?;
        self.adds.fetch_add(1, Ordering::SeqCst);
        let id = self.allocate_id()?;
        self.documents
            .write()
            .await
            .insert(id.as_str().to_string(), document);
        tracing::debug!(target: "sync::remote", remote_id = %id, "document added");
        Ok(id)
    }

    async fn update(&self, id: &RemoteId, document: Value) -> Result<(), AppError> {
        self.simulate_transport().await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.write().await;
        let existing = documents.get_mut(id.as_str()).ok_or_else(|| {
            AppError::NotFound(format!("{} document {id}", self.collection))
        })?;

        match (existing, document) {
            (Value::Object(current), Value::Object(fields)) => current.extend(fields),
            (slot, replacement) => *slot = replacement,
        }
        Ok(())
    }

    async fn delete(&self, id: &RemoteId) -> Result<(), AppError> {
        self.simulate_transport().await?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.documents.write().await.remove(id.as_str());
        let mut deleted = self.deleted.write().await;
        if deleted.len() == DELETED_LOG_CAPACITY {
            deleted.pop_front();
        }
        deleted.push_back(id.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RemoteDocument>, AppError> {
        self.simulate_transport().await?;
        self.lists.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.read().await;
        let mut snapshot = Vec::with_capacity(documents.len());
        for (id, data) in documents.iter() {
            let id = RemoteId::new(id.clone()).map_err(AppError::Internal)?;
            snapshot.push(RemoteDocument {
                id,
                data: data.clone(),
            });
        }
        Ok(snapshot)
    }
}
