use crate::domain::entities::{TodoPayload, TodoRecord};
use crate::domain::value_objects::{LocalId, RemoteId, SyncStatus};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

pub(super) fn map_todo_row(row: &SqliteRow) -> Result<TodoRecord, AppError> {
    let local_id: String = row.try_get("local_id")?;
    let remote_id: Option<String> = row.try_get("remote_id")?;
    let sync_status: String = row.try_get("sync_status")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(TodoRecord {
        local_id: LocalId::new(local_id).map_err(AppError::DeserializationError)?,
        remote_id: RemoteId::from_column(remote_id),
        payload: TodoPayload {
            name: row.try_get("name")?,
            age: row.try_get("age")?,
            is_checked: row.try_get("is_checked")?,
        },
        is_synced: row.try_get("is_synced")?,
        sync_status: sync_status
            .parse::<SyncStatus>()
            .map_err(AppError::DeserializationError)?,
        revision: row.try_get("revision")?,
        created_at: timestamp_from_millis(created_at),
        updated_at: timestamp_from_millis(updated_at),
    })
}

pub(super) fn remote_id_column(record: &TodoRecord) -> Option<&str> {
    record.remote_id.as_ref().map(RemoteId::as_str)
}

fn timestamp_from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
