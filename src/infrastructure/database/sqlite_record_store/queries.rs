pub(super) const INSERT_TODO: &str = r#"
    INSERT INTO todos (
        local_id, remote_id, name, age, is_checked,
        is_synced, sync_status, revision, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
"#;

pub(super) const SELECT_TODO_BY_LOCAL_ID: &str = r#"
    SELECT local_id, remote_id, name, age, is_checked,
           is_synced, sync_status, revision, created_at, updated_at
    FROM todos
    WHERE local_id = ?1
"#;

pub(super) const SELECT_ALL_TODOS: &str = r#"
    SELECT local_id, remote_id, name, age, is_checked,
           is_synced, sync_status, revision, created_at, updated_at
    FROM todos
    ORDER BY position ASC
"#;

pub(super) const SELECT_VISIBLE_TODOS: &str = r#"
    SELECT local_id, remote_id, name, age, is_checked,
           is_synced, sync_status, revision, created_at, updated_at
    FROM todos
    WHERE sync_status != 'deleted'
    ORDER BY position ASC
"#;

pub(super) const SELECT_UNSYNCED_TODOS: &str = r#"
    SELECT local_id, remote_id, name, age, is_checked,
           is_synced, sync_status, revision, created_at, updated_at
    FROM todos
    WHERE is_synced = 0
    ORDER BY position ASC
"#;

pub(super) const SELECT_TODOS_BY_REMOTE_ID: &str = r#"
    SELECT local_id, remote_id, name, age, is_checked,
           is_synced, sync_status, revision, created_at, updated_at
    FROM todos
    WHERE remote_id = ?1
    ORDER BY position ASC
"#;

pub(super) const UPDATE_TODO: &str = r#"
    UPDATE todos
    SET remote_id = ?2,
        name = ?3,
        age = ?4,
        is_checked = ?5,
        is_synced = ?6,
        sync_status = ?7,
        revision = ?8,
        updated_at = ?9
    WHERE local_id = ?1
"#;

pub(super) const DELETE_TODO: &str = r#"
    DELETE FROM todos
    WHERE local_id = ?1
"#;
