use crate::domain::entities::{TodoDraft, TodoRecord};
use crate::domain::value_objects::{LocalId, RemoteId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Typed predicate for local queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    All,
    /// Everything not pending deletion.
    Visible,
    Unsynced,
    ByRemoteId(RemoteId),
}

pub type RecordMutator = Box<dyn FnOnce(&mut TodoRecord) + Send>;

/// Live query results; the first item is the current snapshot.
pub type RecordStream = BoxStream<'static, Result<Vec<TodoRecord>, AppError>>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, draft: TodoDraft) -> Result<TodoRecord, AppError>;
    async fn find(&self, local_id: &LocalId) -> Result<TodoRecord, AppError>;
    async fn query(&self, query: RecordQuery) -> Result<Vec<TodoRecord>, AppError>;
    fn observe(&self, query: RecordQuery) -> RecordStream;
    /// Applies `mutator` to the stored row atomically and returns the written row.
    async fn update(
        &self,
        local_id: &LocalId,
        mutator: RecordMutator,
    ) -> Result<TodoRecord, AppError>;
    async fn destroy_permanently(&self, local_id: &LocalId) -> Result<(), AppError>;
}
