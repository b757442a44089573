use super::ConnectionPool;
use crate::application::ports::record_store::{
    RecordMutator, RecordQuery, RecordStore, RecordStream,
};
use crate::domain::entities::{TodoDraft, TodoRecord};
use crate::domain::value_objects::{LocalId, RemoteId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mapper::{map_todo_row, remote_id_column};
use queries::{
    DELETE_TODO, INSERT_TODO, SELECT_ALL_TODOS, SELECT_TODOS_BY_REMOTE_ID,
    SELECT_TODO_BY_LOCAL_ID, SELECT_UNSYNCED_TODOS, SELECT_VISIBLE_TODOS, UPDATE_TODO,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

mod mapper;
mod queries;

/// SQLite-backed store for todo rows.
///
/// Writes are serialised through one gate and each committed write bumps a
/// change counter that wakes `observe` streams.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: ConnectionPool,
    write_gate: Arc<Mutex<()>>,
    changes: Arc<watch::Sender<u64>>,
}

impl SqliteRecordStore {
    pub fn new(pool: ConnectionPool) -> Self {
        let (changes, _) = watch::channel(0u64);
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
            changes: Arc::new(changes),
        }
    }

    /// Runs the embedded migrations before handing out the store.
    pub async fn open(pool: ConnectionPool) -> Result<Self, AppError> {
        pool.migrate().await?;
        Ok(Self::new(pool))
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    async fn fetch(&self, query: &RecordQuery) -> Result<Vec<TodoRecord>, AppError> {
        let rows = match query {
            RecordQuery::All => {
                sqlx::query(SELECT_ALL_TODOS)
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
            RecordQuery::Visible => {
                sqlx::query(SELECT_VISIBLE_TODOS)
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
            RecordQuery::Unsynced => {
                sqlx::query(SELECT_UNSYNCED_TODOS)
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
            RecordQuery::ByRemoteId(remote_id) => {
                sqlx::query(SELECT_TODOS_BY_REMOTE_ID)
                    .bind(remote_id.as_str())
                    .fetch_all(self.pool.get_pool())
                    .await?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_todo_row(&row)?);
        }
        Ok(records)
    }
}

struct ObserveState {
    store: SqliteRecordStore,
    receiver: watch::Receiver<u64>,
    query: RecordQuery,
    last: Option<Vec<TodoRecord>>,
    started: bool,
}

fn current_timestamp() -> (i64, DateTime<Utc>) {
    let now = Utc::now();
    let millis = now.timestamp_millis();
    (millis, DateTime::from_timestamp_millis(millis).unwrap_or(now))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, draft: TodoDraft) -> Result<TodoRecord, AppError> {
        let _guard = self.write_gate.lock().await;
        let local_id = LocalId::generate();
        let (millis, stamp) = current_timestamp();

        sqlx::query(INSERT_TODO)
            .bind(local_id.as_str())
            .bind(draft.remote_id.as_ref().map(RemoteId::as_str))
            .bind(&draft.payload.name)
            .bind(draft.payload.age)
            .bind(draft.payload.is_checked)
            .bind(draft.is_synced())
            .bind(draft.sync_status.as_str())
            .bind(millis)
            .execute(self.pool.get_pool())
            .await?;

        let is_synced = draft.is_synced();
        let record = TodoRecord {
            local_id,
            remote_id: draft.remote_id,
            payload: draft.payload,
            is_synced,
            sync_status: draft.sync_status,
            revision: 1,
            created_at: stamp,
            updated_at: stamp,
        };

        tracing::debug!(
            target: "sync::store",
            local_id = %record.local_id,
            status = %record.sync_status,
            "todo row created"
        );
        self.notify_changed();
        Ok(record)
    }

    async fn find(&self, local_id: &LocalId) -> Result<TodoRecord, AppError> {
        let row = sqlx::query(SELECT_TODO_BY_LOCAL_ID)
            .bind(local_id.as_str())
            .fetch_optional(self.pool.get_pool())
            .await?;

        match row {
            Some(row) => map_todo_row(&row),
            None => Err(AppError::NotFound(format!("todo {local_id}"))),
        }
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<TodoRecord>, AppError> {
        self.fetch(&query).await
    }

    fn observe(&self, query: RecordQuery) -> RecordStream {
        let state = ObserveState {
            store: self.clone(),
            receiver: self.changes.subscribe(),
            query,
            last: None,
            started: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.started && state.receiver.changed().await.is_err() {
                    return None;
                }
                state.started = true;

                match state.store.fetch(&state.query).await {
                    Ok(records) => {
                        if state.last.as_ref() == Some(&records) {
                            continue;
                        }
                        state.last = Some(records.clone());
                        return Some((Ok(records), state));
                    }
                    Err(err) => return Some((Err(err), state)),
                }
            }
        })
        .boxed()
    }

    async fn update(
        &self,
        local_id: &LocalId,
        mutator: RecordMutator,
    ) -> Result<TodoRecord, AppError> {
        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.get_pool().begin().await?;

        let row = sqlx::query(SELECT_TODO_BY_LOCAL_ID)
            .bind(local_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let current = match row {
            Some(row) => map_todo_row(&row)?,
            None => return Err(AppError::NotFound(format!("todo {local_id}"))),
        };

        let mut next = current.clone();
        mutator(&mut next);
        next.local_id = current.local_id.clone();
        next.created_at = current.created_at;
        next.revision = current.revision;
        next.updated_at = current.updated_at;

        if next == current {
            tx.rollback().await?;
            return Ok(current);
        }

        let (millis, stamp) = current_timestamp();
        next.revision = current.revision + 1;
        next.updated_at = stamp;

        sqlx::query(UPDATE_TODO)
            .bind(next.local_id.as_str())
            .bind(remote_id_column(&next))
            .bind(&next.payload.name)
            .bind(next.payload.age)
            .bind(next.payload.is_checked)
            .bind(next.is_synced)
            .bind(next.sync_status.as_str())
            .bind(next.revision)
            .bind(millis)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.notify_changed();
        Ok(next)
    }

    async fn destroy_permanently(&self, local_id: &LocalId) -> Result<(), AppError> {
        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(DELETE_TODO)
            .bind(local_id.as_str())
            .execute(self.pool.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("todo {local_id}")));
        }

        tracing::debug!(target: "sync::store", local_id = %local_id, "todo row destroyed");
        self.notify_changed();
        Ok(())
    }
}
