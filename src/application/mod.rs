pub mod ports;
pub mod services;

pub use services::{
    FullSyncReport, ListenerHandle, PullOutcome, PullResult, PushOutcome, SyncEngine, SyncResult,
};
