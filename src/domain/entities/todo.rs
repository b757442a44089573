use crate::domain::value_objects::{LocalId, RemoteId, SyncStatus};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Business fields shared with the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPayload {
    pub name: String,
    pub age: i64,
    #[serde(default)]
    pub is_checked: bool,
}

impl TodoPayload {
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            name: name.into(),
            age,
            is_checked: false,
        }
    }

    pub fn with_checked(mut self, is_checked: bool) -> Self {
        self.is_checked = is_checked;
        self
    }

    pub fn to_document(&self) -> Result<Value, AppError> {
        serde_json::to_value(self).map_err(|err| AppError::SerializationError(err.to_string()))
    }

    pub fn from_document(document: &Value) -> Result<Self, AppError> {
        Self::deserialize(document).map_err(|err| AppError::DeserializationError(err.to_string()))
    }

    pub fn apply(&mut self, patch: &TodoPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(age) = patch.age {
            self.age = age;
        }
        if let Some(is_checked) = patch.is_checked {
            self.is_checked = is_checked;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub is_checked: Option<bool>,
}

impl TodoPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }

    pub fn checked(mut self, is_checked: bool) -> Self {
        self.is_checked = Some(is_checked);
        self
    }
}

/// Initial fields for a new local row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    pub payload: TodoPayload,
    pub remote_id: Option<RemoteId>,
    pub sync_status: SyncStatus,
}

impl TodoDraft {
    /// A row written by the user, not yet pushed.
    pub fn local(payload: TodoPayload) -> Self {
        Self {
            payload,
            remote_id: None,
            sync_status: SyncStatus::Created,
        }
    }

    /// A row materialised from a remote document.
    pub fn from_remote(remote_id: RemoteId, payload: TodoPayload) -> Self {
        Self {
            payload,
            remote_id: Some(remote_id),
            sync_status: SyncStatus::Synced,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status == SyncStatus::Synced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushConfirmation {
    /// Local row still matches what was pushed.
    Settled,
    /// Local row changed while the push was in flight; it stays pending.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoRecord {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub payload: TodoPayload,
    pub is_synced: bool,
    pub sync_status: SyncStatus,
    /// Bumped by the store on every committed write.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoRecord {
    /// True when the remote store has never seen this record.
    pub fn never_pushed(&self) -> bool {
        self.remote_id.is_none() || self.sync_status == SyncStatus::Created
    }

    /// A record that was never pushed stays `created`.
    pub fn apply_local_edit(&mut self, patch: &TodoPatch) {
        self.payload.apply(patch);
        self.is_synced = false;
        self.sync_status = match self.sync_status {
            SyncStatus::Created => SyncStatus::Created,
            _ => SyncStatus::Updated,
        };
    }

    pub fn mark_deleted(&mut self) {
        self.is_synced = false;
        self.sync_status = SyncStatus::Deleted;
    }

    /// Records a confirmed remote write made from the row at `pushed_revision`.
    pub fn confirm_push(&mut self, remote_id: RemoteId, pushed_revision: i64) -> PushConfirmation {
        self.remote_id = Some(remote_id);

        if self.revision == pushed_revision && self.sync_status != SyncStatus::Deleted {
            self.is_synced = true;
            self.sync_status = SyncStatus::Synced;
            return PushConfirmation::Settled;
        }

        self.is_synced = false;
        if self.sync_status != SyncStatus::Deleted {
            self.sync_status = SyncStatus::Updated;
        }
        PushConfirmation::Superseded
    }

    /// Overwrites the payload only when no local change is pending.
    pub fn apply_remote_payload(&mut self, payload: &TodoPayload) -> bool {
        if !self.is_synced {
            return false;
        }
        if self.payload != *payload {
            self.payload = payload.clone();
        }
        true
    }
}
