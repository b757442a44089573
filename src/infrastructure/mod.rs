pub mod database;
pub mod network;
pub mod remote;

pub use database::{ConnectionPool, SqliteRecordStore};
pub use network::{ProbeNetworkMonitor, ReportedNetworkMonitor};
pub use remote::MemoryRemoteStore;
