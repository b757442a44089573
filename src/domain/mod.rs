pub mod entities;
pub mod value_objects;

pub use entities::{TodoDraft, TodoPatch, TodoPayload, TodoRecord};
pub use value_objects::{LocalId, NetworkState, RemoteId, SyncStatus};
