mod background;
mod listeners;
mod metrics;

pub use listeners::{ListenerHandle, ListenerId};
pub use metrics::{SyncMetricsSnapshot, SyncPassOutcome};

use crate::application::ports::{
    NetworkMonitor, RecordQuery, RecordStore, RecordStream, RemoteDocument, RemoteStore,
};
use crate::domain::entities::{PushConfirmation, TodoDraft, TodoPatch, TodoPayload, TodoRecord};
use crate::domain::value_objects::{LocalId, NetworkState, RemoteId, SyncStatus};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use background::BackgroundTasks;
use listeners::ListenerRegistry;
use metrics::SyncMetrics;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;

type SyncCompleteListener = dyn Fn() + Send + Sync;
type NetworkChangeListener = dyn Fn(bool) + Send + Sync;

/// Claimed records mapped to "another push asked for this record meanwhile".
type ClaimTable = Mutex<HashMap<LocalId, bool>>;

/// Upper bound on pushes of one record under a single claim.
const MAX_PUSH_ROUNDS: usize = 4;

/// Counts for one push pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub synced_count: u32,
    pub failed_count: u32,
    /// Records left pending: changed mid-push or claimed by another push.
    pub pending_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum PushOutcome {
    AlreadyRunning,
    Offline,
    Completed(SyncResult),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub inserted: u32,
    pub refreshed: u32,
    /// Remote copies ignored because the local record has pending changes.
    pub preserved: u32,
    pub rejected: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum PullOutcome {
    Offline,
    Failed,
    Completed(PullResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncReport {
    pub push: PushOutcome,
    pub pull: PullOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordPush {
    Synced,
    Removed,
    Pending,
    /// Another push holds the record.
    Claimed,
    /// Nothing left to push by the time the record was claimed.
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    Inserted,
    Refreshed,
    Preserved,
    Unchanged,
}

/// Releases the single-flight flag on every exit path.
struct PushFlight<'a>(&'a AtomicBool);

impl Drop for PushFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct RecordClaim {
    claims: Arc<ClaimTable>,
    local_id: LocalId,
    released: bool,
}

impl RecordClaim {
    /// Releases the claim, or keeps it and returns false when a skipped push
    /// asked for the record in the meantime.
    fn release_unless_requested(&mut self) -> bool {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(requested) = claims.get_mut(&self.local_id) {
            if *requested {
                *requested = false;
                return false;
            }
        }
        claims.remove(&self.local_id);
        self.released = true;
        true
    }
}

impl Drop for RecordClaim {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.local_id);
    }
}

/// Owns every todo mutation and keeps the local store and the remote
/// collection eventually consistent.
///
/// Local writes return as soon as the store commits; remote propagation runs
/// on supervised background tasks and only ever degrades a record to
/// "still pending".
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteStore>,
    network: Arc<dyn NetworkMonitor>,
    config: Arc<SyncConfig>,
    is_online: Arc<AtomicBool>,
    sync_in_progress: Arc<AtomicBool>,
    sync_listeners: Arc<ListenerRegistry<SyncCompleteListener>>,
    network_listeners: Arc<ListenerRegistry<NetworkChangeListener>>,
    network_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    background: BackgroundTasks,
    claims: Arc<ClaimTable>,
    // Pull holds it exclusively; pushes hold it shared while they record remote ids.
    reconcile_gate: Arc<RwLock<()>>,
    metrics: Arc<SyncMetrics>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteStore>,
        network: Arc<dyn NetworkMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            network,
            config: Arc::new(config),
            is_online: Arc::new(AtomicBool::new(true)),
            sync_in_progress: Arc::new(AtomicBool::new(false)),
            sync_listeners: Arc::new(ListenerRegistry::new("sync_complete")),
            network_listeners: Arc::new(ListenerRegistry::new("network_change")),
            network_task: Arc::new(Mutex::new(None)),
            background: BackgroundTasks::new(),
            claims: Arc::new(Mutex::new(HashMap::new())),
            reconcile_gate: Arc::new(RwLock::new(())),
            metrics: Arc::new(SyncMetrics::default()),
        }
    }

    pub async fn create(&self, payload: TodoPayload) -> Result<TodoRecord, AppError> {
        let record = self.store.create(TodoDraft::local(payload)).await?;
        tracing::debug!(
            target: "sync::engine",
            local_id = %record.local_id,
            "todo created locally"
        );
        self.schedule_record_push(record.local_id.clone());
        Ok(record)
    }

    pub async fn update(
        &self,
        local_id: &LocalId,
        patch: TodoPatch,
    ) -> Result<TodoRecord, AppError> {
        let record = self
            .store
            .update(
                local_id,
                Box::new(move |record: &mut TodoRecord| record.apply_local_edit(&patch)),
            )
            .await?;
        tracing::debug!(
            target: "sync::engine",
            local_id = %record.local_id,
            status = %record.sync_status,
            "todo updated locally"
        );
        self.schedule_record_push(record.local_id.clone());
        Ok(record)
    }

    /// Never-pushed records are removed at once; others are soft-deleted
    /// until the remote delete is confirmed.
    pub async fn delete(&self, local_id: &LocalId) -> Result<(), AppError> {
        let record = self.store.find(local_id).await?;

        if record.never_pushed() {
            self.store.destroy_permanently(local_id).await?;
            tracing::debug!(
                target: "sync::engine",
                local_id = %local_id,
                "never-synced todo removed locally"
            );
            return Ok(());
        }

        self.store
            .update(
                local_id,
                Box::new(|record: &mut TodoRecord| record.mark_deleted()),
            )
            .await?;
        tracing::debug!(target: "sync::engine", local_id = %local_id, "todo marked deleted");
        self.schedule_record_push(local_id.clone());
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<TodoRecord>, AppError> {
        self.store.query(RecordQuery::Visible).await
    }

    /// Live `list()` snapshots; the first item is the current list.
    pub fn observe(&self) -> RecordStream {
        self.store.observe(RecordQuery::Visible)
    }

    /// Probes once and caches the result. A failed probe reads as offline
    /// and leaves the cached flag alone.
    pub async fn check_connection(&self) -> bool {
        match self.network.fetch_once().await {
            Ok(state) => {
                let online = state.is_online();
                self.is_online.store(online, Ordering::SeqCst);
                online
            }
            Err(err) => {
                tracing::warn!(target: "sync::network", error = %err, "connectivity probe failed");
                false
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::SeqCst)
    }

    /// Pushes every unsynced record. Overlapping calls return
    /// [`PushOutcome::AlreadyRunning`] instead of queueing.
    pub async fn push_pending(&self) -> Result<PushOutcome, AppError> {
        if self
            .sync_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(target: "sync::engine", "push already in progress");
            return Ok(PushOutcome::AlreadyRunning);
        }
        let _flight = PushFlight(self.sync_in_progress.as_ref());

        if !self.check_connection().await {
            tracing::debug!(target: "sync::engine", "offline, push skipped");
            return Ok(PushOutcome::Offline);
        }

        let pending = self.store.query(RecordQuery::Unsynced).await?;
        tracing::info!(target: "sync::engine", pending = pending.len(), "pushing pending todos");

        let mut result = SyncResult::default();
        for record in pending {
            match self.push_claimed(&record.local_id).await {
                Ok(RecordPush::Synced | RecordPush::Removed) => result.synced_count += 1,
                Ok(RecordPush::Pending | RecordPush::Claimed) => result.pending_count += 1,
                Ok(RecordPush::Settled) => {}
                Err(err) if err.is_transient() => {
                    result.failed_count += 1;
                    tracing::warn!(
                        target: "sync::engine",
                        local_id = %record.local_id,
                        error = %err,
                        "todo push failed, will retry"
                    );
                }
                Err(err) => {
                    result.failed_count += 1;
                    tracing::error!(
                        target: "sync::engine",
                        local_id = %record.local_id,
                        error = %err,
                        "todo push failed"
                    );
                }
            }
        }

        self.metrics.record_push(result);
        tracing::info!(
            target: "sync::engine",
            synced = result.synced_count,
            failed = result.failed_count,
            pending = result.pending_count,
            "push pass finished"
        );
        Ok(PushOutcome::Completed(result))
    }

    /// Upserts the remote collection into the local store. Records with
    /// pending local changes keep their local payload. Local rows missing
    /// remotely are left alone.
    pub async fn pull_remote(&self) -> PullOutcome {
        if !self.check_connection().await {
            tracing::debug!(target: "sync::engine", "offline, pull skipped");
            return PullOutcome::Offline;
        }

        let _gate = self.reconcile_gate.write().await;
        let documents = match self.remote.list().await {
            Ok(documents) => documents,
            Err(err) => {
                tracing::warn!(
                    target: "sync::engine",
                    collection = self.remote.collection(),
                    error = %err,
                    "pull failed"
                );
                self.metrics.record_pull(false);
                return PullOutcome::Failed;
            }
        };

        let mut result = PullResult::default();
        for document in documents {
            let remote_id = document.id.clone();
            match self.reconcile_document(document).await {
                Ok(Reconciled::Inserted) => result.inserted += 1,
                Ok(Reconciled::Refreshed) => result.refreshed += 1,
                Ok(Reconciled::Preserved) => result.preserved += 1,
                Ok(Reconciled::Unchanged) => {}
                Err(err) => {
                    result.rejected += 1;
                    tracing::warn!(
                        target: "sync::engine",
                        remote_id = %remote_id,
                        error = %err,
                        "remote todo skipped"
                    );
                }
            }
        }

        self.metrics.record_pull(true);
        tracing::info!(
            target: "sync::engine",
            inserted = result.inserted,
            refreshed = result.refreshed,
            preserved = result.preserved,
            rejected = result.rejected,
            "pull finished"
        );
        PullOutcome::Completed(result)
    }

    /// Push, then pull, then notify sync-complete listeners.
    pub async fn full_sync(&self) -> Result<FullSyncReport, AppError> {
        self.metrics.record_full_sync();
        tracing::info!(target: "sync::engine", "full sync started");

        let push = self.push_pending().await;
        let pull = self.pull_remote().await;
        self.notify_sync_complete();

        Ok(FullSyncReport { push: push?, pull })
    }

    pub fn on_sync_complete<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.sync_listeners.register(Arc::new(callback))
    }

    pub fn on_network_change<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.network_listeners.register(Arc::new(callback))
    }

    /// Seeds the online flag and starts following the network monitor.
    /// Calling it again replaces the previous subscription.
    pub async fn init(&self) {
        let receiver = self.network.subscribe();
        let online = self.check_connection().await;
        tracing::info!(target: "sync::engine", online, "sync engine initialised");

        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.watch_network(receiver, online).await });

        let mut slot = self
            .network_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stops following the network and drops every listener. Background
    /// pushes already running are left to finish.
    pub fn cleanup(&self) {
        let previous = self
            .network_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            handle.abort();
            tracing::info!(target: "sync::engine", "network subscription closed");
        }
        self.sync_listeners.clear();
        self.network_listeners.clear();
    }

    pub fn metrics_snapshot(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolves once every background push or sync spawned so far is done.
    pub async fn wait_for_background(&self) {
        self.background.wait_idle().await;
    }

    fn notify_sync_complete(&self) {
        self.sync_listeners.notify(|listener| listener());
    }

    fn schedule_record_push(&self, local_id: LocalId) {
        if !self.config.push_on_write {
            return;
        }
        let engine = self.clone();
        self.background.spawn("record_push", async move {
            engine.push_in_background(local_id).await;
            Ok(())
        });
    }

    async fn push_in_background(&self, local_id: LocalId) {
        if !self.check_connection().await {
            tracing::debug!(
                target: "sync::engine",
                local_id = %local_id,
                "offline, todo stays pending"
            );
            return;
        }

        match self.push_claimed(&local_id).await {
            Ok(RecordPush::Synced) => self.notify_sync_complete(),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    target: "sync::engine",
                    local_id = %local_id,
                    error = %err,
                    "background push failed, todo stays pending"
                );
            }
        }
    }

    /// Takes the record for this push. When another push holds it, leaves a
    /// request so the holder pushes once more before letting go.
    fn try_claim(&self, local_id: &LocalId) -> Option<RecordClaim> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        match claims.entry(local_id.clone()) {
            Entry::Occupied(mut held) => {
                *held.get_mut() = true;
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(false);
                Some(RecordClaim {
                    claims: Arc::clone(&self.claims),
                    local_id: local_id.clone(),
                    released: false,
                })
            }
        }
    }

    /// Claims the record and pushes whatever intent it carries, again and
    /// again while local edits keep landing during the push.
    async fn push_claimed(&self, local_id: &LocalId) -> Result<RecordPush, AppError> {
        let Some(mut claim) = self.try_claim(local_id) else {
            tracing::debug!(
                target: "sync::engine",
                local_id = %local_id,
                "todo already being pushed"
            );
            return Ok(RecordPush::Claimed);
        };

        let mut round = 1;
        let mut landed = None;
        loop {
            // A re-push round that finds nothing left keeps the earlier result.
            let outcome = match (self.push_current(local_id).await, landed) {
                (Ok(RecordPush::Settled), Some(previous)) => Ok(previous),
                (outcome, _) => outcome,
            };
            if let Ok(push @ (RecordPush::Synced | RecordPush::Removed)) = &outcome {
                landed = Some(*push);
            }
            let superseded = matches!(outcome, Ok(RecordPush::Pending));
            if outcome.is_err() || round >= MAX_PUSH_ROUNDS {
                return outcome;
            }
            if !superseded && claim.release_unless_requested() {
                return outcome;
            }
            round += 1;
            tracing::debug!(
                target: "sync::engine",
                local_id = %local_id,
                round,
                "todo changed during push, pushing again"
            );
        }
    }

    /// Reloads the record and pushes the intent it carries now.
    async fn push_current(&self, local_id: &LocalId) -> Result<RecordPush, AppError> {
        let _gate = self.reconcile_gate.read().await;

        let record = match self.store.find(local_id).await {
            Ok(record) => record,
            Err(err) if err.is_not_found() => return Ok(RecordPush::Settled),
            Err(err) => return Err(err),
        };
        if record.is_synced {
            return Ok(RecordPush::Settled);
        }

        match record.sync_status {
            SyncStatus::Deleted => self.push_delete(record).await,
            SyncStatus::Created => self.push_create(record).await,
            SyncStatus::Updated | SyncStatus::Synced => match record.remote_id.clone() {
                Some(remote_id) => self.push_update(record, remote_id).await,
                None => self.push_create(record).await,
            },
        }
    }

    async fn push_create(&self, record: TodoRecord) -> Result<RecordPush, AppError> {
        let remote_id = self.remote.add(record.payload.to_document()?).await?;
        tracing::debug!(
            target: "sync::remote",
            local_id = %record.local_id,
            remote_id = %remote_id,
            "remote todo created"
        );
        self.confirm_push(&record, remote_id).await
    }

    async fn push_update(
        &self,
        record: TodoRecord,
        remote_id: RemoteId,
    ) -> Result<RecordPush, AppError> {
        match self
            .remote
            .update(&remote_id, record.payload.to_document()?)
            .await
        {
            Ok(()) => self.confirm_push(&record, remote_id).await,
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    target: "sync::remote",
                    local_id = %record.local_id,
                    remote_id = %remote_id,
                    "remote todo missing, re-creating"
                );
                self.push_create(record).await
            }
            Err(err) => Err(err),
        }
    }

    async fn push_delete(&self, record: TodoRecord) -> Result<RecordPush, AppError> {
        if let Some(remote_id) = &record.remote_id {
            match self.remote.delete(remote_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    tracing::debug!(
                        target: "sync::remote",
                        remote_id = %remote_id,
                        "remote todo already gone"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        // Edited again while the remote delete was in flight: keep the row.
        let current = match self.store.find(&record.local_id).await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => return Ok(RecordPush::Removed),
            Err(err) => return Err(err),
        };
        if current.sync_status != SyncStatus::Deleted {
            return Ok(RecordPush::Pending);
        }

        match self.store.destroy_permanently(&record.local_id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        tracing::debug!(
            target: "sync::engine",
            local_id = %record.local_id,
            "deleted todo removed after remote confirmation"
        );
        Ok(RecordPush::Removed)
    }

    async fn confirm_push(
        &self,
        record: &TodoRecord,
        remote_id: RemoteId,
    ) -> Result<RecordPush, AppError> {
        let pushed_revision = record.revision;
        let confirmed_id = remote_id.clone();
        let (confirmation_tx, confirmation_rx) = oneshot::channel();
        let written = self
            .store
            .update(
                &record.local_id,
                Box::new(move |row: &mut TodoRecord| {
                    let confirmation = row.confirm_push(confirmed_id, pushed_revision);
                    let _ = confirmation_tx.send(confirmation);
                }),
            )
            .await;

        match written {
            Ok(row) => match confirmation_rx.await {
                Ok(PushConfirmation::Settled) => Ok(RecordPush::Synced),
                Ok(PushConfirmation::Superseded) => {
                    tracing::debug!(
                        target: "sync::engine",
                        local_id = %row.local_id,
                        status = %row.sync_status,
                        "todo changed during push, left pending"
                    );
                    Ok(RecordPush::Pending)
                }
                Err(_) => Err(AppError::Internal(format!(
                    "push confirmation for todo {} was not applied",
                    row.local_id
                ))),
            },
            Err(err) if err.is_not_found() => {
                // The row was removed while the write was in flight.
                self.remote.delete(&remote_id).await?;
                tracing::debug!(
                    target: "sync::remote",
                    local_id = %record.local_id,
                    remote_id = %remote_id,
                    "orphaned remote todo removed"
                );
                Ok(RecordPush::Removed)
            }
            Err(err) => Err(err),
        }
    }

    async fn reconcile_document(&self, document: RemoteDocument) -> Result<Reconciled, AppError> {
        let payload = TodoPayload::from_document(&document.data)?;
        let existing = self
            .store
            .query(RecordQuery::ByRemoteId(document.id.clone()))
            .await?;

        let Some(local) = existing.into_iter().next() else {
            self.store
                .create(TodoDraft::from_remote(document.id, payload))
                .await?;
            return Ok(Reconciled::Inserted);
        };

        if !local.is_synced {
            return Ok(Reconciled::Preserved);
        }
        if local.payload == payload {
            return Ok(Reconciled::Unchanged);
        }

        let incoming = payload.clone();
        let written = self
            .store
            .update(
                &local.local_id,
                Box::new(move |row: &mut TodoRecord| {
                    row.apply_remote_payload(&incoming);
                }),
            )
            .await?;
        if written.payload == payload {
            Ok(Reconciled::Refreshed)
        } else {
            Ok(Reconciled::Preserved)
        }
    }

    async fn watch_network(
        &self,
        mut receiver: broadcast::Receiver<NetworkState>,
        mut last_online: bool,
    ) {
        loop {
            let state = match receiver.recv().await {
                Ok(state) => state,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "sync::network",
                        skipped,
                        "network updates lagged, refetching"
                    );
                    match self.network.fetch_once().await {
                        Ok(state) => state,
                        Err(err) => {
                            tracing::warn!(target: "sync::network", error = %err, "refetch failed");
                            continue;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(target: "sync::network", "network monitor closed");
                    break;
                }
            };

            let online = state.is_online();
            self.is_online.store(online, Ordering::SeqCst);
            if online == last_online {
                continue;
            }
            last_online = online;

            tracing::info!(target: "sync::network", online, "network status changed");
            self.network_listeners.notify(|listener| listener(online));

            if online && self.config.auto_sync_on_reconnect {
                let engine = self.clone();
                self.background.spawn("reconnect_sync", async move {
                    engine.full_sync().await.map(|_| ())
                });
            }
        }
    }
}

impl Clone for SyncEngine {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: self.remote.clone(),
            network: self.network.clone(),
            config: self.config.clone(),
            is_online: self.is_online.clone(),
            sync_in_progress: self.sync_in_progress.clone(),
            sync_listeners: self.sync_listeners.clone(),
            network_listeners: self.network_listeners.clone(),
            network_task: self.network_task.clone(),
            background: self.background.clone(),
            claims: self.claims.clone(),
            reconcile_gate: self.reconcile_gate.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{ConnectionPool, SqliteRecordStore};
    use crate::infrastructure::network::ReportedNetworkMonitor;
    use crate::infrastructure::remote::MemoryRemoteStore;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Harness {
        engine: SyncEngine,
        store: Arc<SqliteRecordStore>,
        remote: Arc<MemoryRemoteStore>,
        network: Arc<ReportedNetworkMonitor>,
    }

    async fn harness(online: bool, push_on_write: bool) -> Harness {
        let pool = ConnectionPool::from_memory().await.unwrap();
        let store = Arc::new(SqliteRecordStore::open(pool).await.unwrap());
        let remote = Arc::new(MemoryRemoteStore::new("Todo"));
        let network = Arc::new(if online {
            ReportedNetworkMonitor::online()
        } else {
            ReportedNetworkMonitor::offline()
        });
        let config = SyncConfig {
            push_on_write,
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(store.clone(), remote.clone(), network.clone(), config);
        Harness {
            engine,
            store,
            remote,
            network,
        }
    }

    async fn settle(engine: &SyncEngine) {
        tokio::time::timeout(Duration::from_secs(5), engine.wait_for_background())
            .await
            .expect("background work should finish");
    }

    #[tokio::test]
    async fn test_create_online_pushes_in_background_and_notifies() {
        let h = harness(true, true).await;
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _handle = h.engine.on_sync_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let created = h.engine.create(TodoPayload::new("Alice", 30)).await.unwrap();
        assert_eq!(created.sync_status, SyncStatus::Created);
        settle(&h.engine).await;

        let stored = h.store.find(&created.local_id).await.unwrap();
        assert!(stored.is_synced);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        let remote_id = stored.remote_id.unwrap();
        assert_eq!(
            h.remote.document(&remote_id).await.unwrap(),
            json!({"name": "Alice", "age": 30, "isChecked": false})
        );
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_created_status_until_first_push() {
        let h = harness(false, true).await;
        let created = h.engine.create(TodoPayload::new("Bob", 41)).await.unwrap();

        let updated = h
            .engine
            .update(&created.local_id, TodoPatch::default().checked(true))
            .await
            .unwrap();
        settle(&h.engine).await;

        assert_eq!(updated.sync_status, SyncStatus::Created);
        assert!(updated.payload.is_checked);
        assert!(updated.remote_id.is_none());
        assert_eq!(h.remote.stats().adds, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id_are_not_found() {
        let h = harness(true, false).await;
        let missing = LocalId::generate();

        let err = h
            .engine
            .update(&missing, TodoPatch::default().age(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(h.engine.delete(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_of_synced_record_pushes_remote_update() {
        let h = harness(true, true).await;
        let created = h.engine.create(TodoPayload::new("Carol", 22)).await.unwrap();
        settle(&h.engine).await;

        let updated = h
            .engine
            .update(&created.local_id, TodoPatch::default().name("Caroline"))
            .await
            .unwrap();
        assert_eq!(updated.sync_status, SyncStatus::Updated);
        assert!(!updated.is_synced);
        settle(&h.engine).await;

        let stored = h.store.find(&created.local_id).await.unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        let document = h.remote.document(stored.remote_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(document["name"], "Caroline");
        assert_eq!(h.remote.stats().updates, 1);
    }

    #[tokio::test]
    async fn test_soft_deleted_record_waits_for_remote_confirmation() {
        let h = harness(true, true).await;
        let created = h.engine.create(TodoPayload::new("Dan", 50)).await.unwrap();
        settle(&h.engine).await;
        let remote_id = h.store.find(&created.local_id).await.unwrap().remote_id.unwrap();

        h.network.report(NetworkState::offline()).await;
        h.engine.delete(&created.local_id).await.unwrap();
        settle(&h.engine).await;

        let hidden = h.store.find(&created.local_id).await.unwrap();
        assert_eq!(hidden.sync_status, SyncStatus::Deleted);
        assert!(h.engine.list().await.unwrap().is_empty());
        assert!(h.remote.document(&remote_id).await.is_some());

        h.network.report(NetworkState::online()).await;
        let outcome = h.engine.push_pending().await.unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Completed(SyncResult {
                synced_count: 1,
                failed_count: 0,
                pending_count: 0,
            })
        );
        assert!(h.store.find(&created.local_id).await.unwrap_err().is_not_found());
        assert_eq!(h.remote.deleted_ids().await, vec![remote_id]);
    }

    #[tokio::test]
    async fn test_push_pending_offline_leaves_records_untouched() {
        let h = harness(false, false).await;
        h.engine.create(TodoPayload::new("Eve", 19)).await.unwrap();

        assert_eq!(h.engine.push_pending().await.unwrap(), PushOutcome::Offline);
        assert!(!h.engine.is_online());
        assert_eq!(h.remote.stats().adds, 0);
        assert_eq!(h.store.query(RecordQuery::Unsynced).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_record_pending_and_counts_failure() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Frank", 33)).await.unwrap();
        h.remote.set_available(false);

        let outcome = h.engine.push_pending().await.unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Completed(SyncResult {
                synced_count: 0,
                failed_count: 1,
                pending_count: 0,
            })
        );
        let stored = h.store.find(&created.local_id).await.unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Created);

        let metrics = h.engine.metrics_snapshot();
        assert_eq!(metrics.total_failure, 1);
        assert_eq!(metrics.consecutive_failure, 1);

        h.remote.set_available(true);
        h.engine.push_pending().await.unwrap();
        assert!(h.store.find(&created.local_id).await.unwrap().is_synced);
        assert_eq!(h.engine.metrics_snapshot().consecutive_failure, 0);
    }

    #[tokio::test]
    async fn test_missing_remote_document_is_recreated_on_update() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Gina", 28)).await.unwrap();
        h.engine.push_pending().await.unwrap();
        let first_id = h.store.find(&created.local_id).await.unwrap().remote_id.unwrap();

        assert!(h.remote.remove_document(&first_id).await);
        h.engine
            .update(&created.local_id, TodoPatch::default().age(29))
            .await
            .unwrap();
        h.engine.push_pending().await.unwrap();

        let stored = h.store.find(&created.local_id).await.unwrap();
        let second_id = stored.remote_id.unwrap();
        assert!(stored.is_synced);
        assert_ne!(first_id, second_id);
        assert_eq!(h.remote.document(&second_id).await.unwrap()["age"], 29);
    }

    #[tokio::test]
    async fn test_delete_of_missing_remote_document_counts_as_confirmed() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Hank", 60)).await.unwrap();
        h.engine.push_pending().await.unwrap();
        let remote_id = h.store.find(&created.local_id).await.unwrap().remote_id.unwrap();

        h.remote.remove_document(&remote_id).await;
        h.engine.delete(&created.local_id).await.unwrap();
        h.engine.push_pending().await.unwrap();

        assert!(h.store.find(&created.local_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_edit_during_push_is_pushed_before_claim_release() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Ivy", 24)).await.unwrap();
        h.remote.set_latency(Duration::from_millis(150));

        let engine = h.engine.clone();
        let push = tokio::spawn(async move { engine.push_pending().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine
            .update(&created.local_id, TodoPatch::default().name("Ivy B"))
            .await
            .unwrap();

        let outcome = push.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Completed(SyncResult {
                synced_count: 1,
                failed_count: 0,
                pending_count: 0,
            })
        );
        let stored = h.store.find(&created.local_id).await.unwrap();
        assert!(stored.is_synced);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert_eq!(h.remote.len().await, 1);
        assert_eq!(
            h.remote.document(stored.remote_id.as_ref().unwrap()).await.unwrap()["name"],
            "Ivy B"
        );
        let stats = h.remote.stats();
        assert_eq!(stats.adds, 1);
        assert_eq!(stats.updates, 1);
    }

    #[tokio::test]
    async fn test_update_right_after_online_create_reaches_remote() {
        let h = harness(true, true).await;
        h.remote.set_latency(Duration::from_millis(100));
        let created = h.engine.create(TodoPayload::new("Ola", 31)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.engine
            .update(&created.local_id, TodoPatch::default().name("Ola B"))
            .await
            .unwrap();
        settle(&h.engine).await;

        let stored = h.store.find(&created.local_id).await.unwrap();
        assert!(stored.is_synced);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        let document = h.remote.document(stored.remote_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(document["name"], "Ola B");
        assert_eq!(h.remote.stats().adds, 1);
        assert_eq!(h.remote.len().await, 1);
    }

    #[tokio::test]
    async fn test_updated_row_without_remote_id_is_created_remotely() {
        let h = harness(true, false).await;
        let orphan = h
            .store
            .create(TodoDraft {
                payload: TodoPayload::new("Pia", 52),
                remote_id: None,
                sync_status: SyncStatus::Updated,
            })
            .await
            .unwrap();
        assert!(!orphan.is_synced);

        let outcome = h.engine.push_pending().await.unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Completed(SyncResult {
                synced_count: 1,
                failed_count: 0,
                pending_count: 0,
            })
        );
        let stored = h.store.find(&orphan.local_id).await.unwrap();
        assert!(stored.is_synced);
        let document = h.remote.document(stored.remote_id.as_ref().unwrap()).await.unwrap();
        assert_eq!(document["name"], "Pia");
        let stats = h.remote.stats();
        assert_eq!(stats.adds, 1);
        assert_eq!(stats.updates, 0);
    }

    #[tokio::test]
    async fn test_delete_during_create_push_removes_orphaned_remote_document() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Jack", 35)).await.unwrap();
        h.remote.set_latency(Duration::from_millis(150));

        let engine = h.engine.clone();
        let push = tokio::spawn(async move { engine.push_pending().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.delete(&created.local_id).await.unwrap();
        push.await.unwrap().unwrap();

        assert!(h.remote.is_empty().await);
        assert_eq!(h.remote.stats().adds, 1);
        assert_eq!(h.remote.deleted_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_claimed_by_full_pass_is_skipped_by_record_push() {
        let h = harness(true, false).await;
        let created = h.engine.create(TodoPayload::new("Kim", 44)).await.unwrap();
        h.remote.set_latency(Duration::from_millis(150));

        let engine = h.engine.clone();
        let pass = tokio::spawn(async move { engine.push_pending().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let direct = h.engine.push_claimed(&created.local_id).await.unwrap();
        assert_eq!(direct, RecordPush::Claimed);

        let outcome = pass.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            PushOutcome::Completed(SyncResult {
                synced_count: 1,
                failed_count: 0,
                pending_count: 0,
            })
        );
        assert_eq!(h.remote.stats().adds, 1);
        assert_eq!(h.remote.stats().updates, 0);
    }

    #[tokio::test]
    async fn test_pull_inserts_refreshes_and_preserves() {
        let h = harness(true, false).await;
        let clean = h.engine.create(TodoPayload::new("Lee", 20)).await.unwrap();
        let dirty = h.engine.create(TodoPayload::new("Max", 21)).await.unwrap();
        h.engine.push_pending().await.unwrap();

        let clean_id = h.store.find(&clean.local_id).await.unwrap().remote_id.unwrap();
        let dirty_id = h.store.find(&dirty.local_id).await.unwrap().remote_id.unwrap();
        h.remote
            .update(&clean_id, json!({"name": "Lee", "age": 70, "isChecked": true}))
            .await
            .unwrap();
        h.remote
            .update(&dirty_id, json!({"name": "Remote Max"}))
            .await
            .unwrap();
        h.engine
            .update(&dirty.local_id, TodoPatch::default().name("Local Max"))
            .await
            .unwrap();
        h.remote
            .insert_document(json!({"name": "Nia", "age": 5})).await.unwrap();
        h.remote.insert_document(json!({"title": 12})).await.unwrap();

        let outcome = h.engine.pull_remote().await;
        assert_eq!(
            outcome,
            PullOutcome::Completed(PullResult {
                inserted: 1,
                refreshed: 1,
                preserved: 1,
                rejected: 1,
            })
        );

        let refreshed = h.store.find(&clean.local_id).await.unwrap();
        assert_eq!(refreshed.payload, TodoPayload::new("Lee", 70).with_checked(true));
        assert!(refreshed.is_synced);
        let preserved = h.store.find(&dirty.local_id).await.unwrap();
        assert_eq!(preserved.payload.name, "Local Max");

        let visible = h.engine.list().await.unwrap();
        assert_eq!(visible.len(), 3);
        let inserted = visible.last().unwrap();
        assert_eq!(inserted.payload.name, "Nia");
        assert_eq!(inserted.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_pull_failure_is_reported_not_raised() {
        let h = harness(true, false).await;
        h.remote.set_available(false);

        assert_eq!(h.engine.pull_remote().await, PullOutcome::Failed);
        assert_eq!(h.engine.metrics_snapshot().total_failure, 1);

        h.network.report(NetworkState::offline()).await;
        assert_eq!(h.engine.pull_remote().await, PullOutcome::Offline);
    }

    #[tokio::test]
    async fn test_full_sync_notifies_even_when_offline() {
        let h = harness(false, false).await;
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let handle = h.engine.on_sync_complete(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = h.engine.full_sync().await.unwrap();
        assert_eq!(report.push, PushOutcome::Offline);
        assert_eq!(report.pull, PullOutcome::Offline);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert!(handle.unsubscribe());
        h.engine.full_sync().await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observe_tracks_visible_records() {
        let h = harness(false, false).await;
        let mut stream = h.engine.observe();

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(first.is_empty());

        let created = h.engine.create(TodoPayload::new("Ola", 3)).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 1);

        h.engine.delete(&created.local_id).await.unwrap();
        let third = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_stops_network_listeners() {
        let h = harness(false, false).await;
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        let _handle = h.engine.on_network_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        h.engine.init().await;
        h.engine.cleanup();
        h.engine.cleanup();

        h.network.report(NetworkState::online()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(changes.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.network_listeners.len(), 0);
        assert_eq!(h.engine.sync_listeners.len(), 0);
    }
}
