pub mod network_monitor;
pub mod record_store;
pub mod remote_store;

pub use network_monitor::NetworkMonitor;
pub use record_store::{RecordMutator, RecordQuery, RecordStore, RecordStream};
pub use remote_store::{RemoteDocument, RemoteStore};
