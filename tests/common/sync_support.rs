use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use todo_sync::domain::NetworkState;
use todo_sync::infrastructure::{
    ConnectionPool, MemoryRemoteStore, ReportedNetworkMonitor, SqliteRecordStore,
};
use todo_sync::shared::config::SyncConfig;
use todo_sync::SyncEngine;

pub struct SyncTestContext {
    pub engine: SyncEngine,
    pub store: Arc<SqliteRecordStore>,
    pub remote: Arc<MemoryRemoteStore>,
    pub network: Arc<ReportedNetworkMonitor>,
}

pub async fn setup_engine(initial: NetworkState, config: SyncConfig) -> SyncTestContext {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    let store = Arc::new(SqliteRecordStore::open(pool).await.expect("migrated store"));
    let remote = Arc::new(MemoryRemoteStore::new(config.collection.clone()));
    let network = Arc::new(ReportedNetworkMonitor::new(initial));

    let engine = SyncEngine::new(store.clone(), remote.clone(), network.clone(), config);

    SyncTestContext {
        engine,
        store,
        remote,
        network,
    }
}

#[allow(dead_code)]
pub async fn setup_offline_engine() -> SyncTestContext {
    setup_engine(NetworkState::offline(), SyncConfig::default()).await
}

#[allow(dead_code)]
pub fn manual_sync_config() -> SyncConfig {
    SyncConfig {
        push_on_write: false,
        ..SyncConfig::default()
    }
}

pub async fn settle(engine: &SyncEngine) {
    tokio::time::timeout(Duration::from_secs(5), engine.wait_for_background())
        .await
        .expect("background work should finish");
}

/// Counts sync-complete notifications.
#[allow(dead_code)]
pub fn count_sync_completions(engine: &SyncEngine) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let _ = engine.on_sync_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

/// Records every network-change notification in order.
#[allow(dead_code)]
pub fn record_network_changes(engine: &SyncEngine) -> Arc<Mutex<Vec<bool>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    let _ = engine.on_network_change(move |online| {
        sink.lock().expect("changes lock").push(online);
    });
    changes
}
