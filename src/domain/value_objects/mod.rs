pub mod local_id;
pub mod network_state;
pub mod remote_id;
pub mod sync_status;

pub use local_id::LocalId;
pub use network_state::NetworkState;
pub use remote_id::RemoteId;
pub use sync_status::SyncStatus;
