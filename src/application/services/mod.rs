pub mod sync_service;

pub use sync_service::{
    FullSyncReport, ListenerHandle, ListenerId, PullOutcome, PullResult, PushOutcome, SyncEngine,
    SyncMetricsSnapshot, SyncResult,
};
