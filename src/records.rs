//! Artifact and session records in the document database.
//!
//! Every mutation is a single-statement write, which is what gives the
//! per-record atomicity the rest of the crate assumes. Ownership filters
//! (`user_id`, `deleted = 0`) are baked into the queries themselves, so a
//! record belonging to another user is indistinguishable from a missing one.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Artifact, ArtifactKind, FileEntry, IngestionState, RepoOrigin, Session, StorageKind,
};

/// Fields supplied at artifact creation; everything else is generated.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub session_id: String,
    pub user_id: String,
    pub kind: ArtifactKind,
    pub name: String,
    pub source: Option<String>,
    pub files: Option<Vec<FileEntry>>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub origin: Option<RepoOrigin>,
    pub state: Option<IngestionState>,
    pub storage: StorageKind,
    pub size: Option<i64>,
}

pub async fn create_session(pool: &SqlitePool, user_id: &str, title: &str) -> Result<Session> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, title, created_at, updated_at, deleted, deleted_at)
        VALUES (?, ?, ?, ?, ?, 0, NULL)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Session {
        id,
        user_id: user_id.to_string(),
        title: title.to_string(),
        created_at: now,
        updated_at: now,
        deleted: false,
        deleted_at: None,
    })
}

/// Ownership guard: the session must exist, belong to the user, and not be
/// deleted. Anything else is "session not found".
pub async fn find_session(pool: &SqlitePool, session_id: &str, user_id: &str) -> Result<Session> {
    let row = sqlx::query(
        "SELECT id, user_id, title, created_at, updated_at, deleted, deleted_at
         FROM sessions WHERE id = ? AND user_id = ? AND deleted = 0",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or(Error::NotFound("session"))?;

    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted: row.get("deleted"),
        deleted_at: row.get("deleted_at"),
    })
}

pub async fn soft_delete_session(
    pool: &SqlitePool,
    session_id: &str,
    user_id: &str,
) -> Result<bool> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE sessions SET deleted = 1, deleted_at = ?, updated_at = ?
         WHERE id = ? AND user_id = ? AND deleted = 0",
    )
    .bind(now)
    .bind(now)
    .bind(session_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_artifact(pool: &SqlitePool, new: NewArtifact) -> Result<Artifact> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    let files_json = match &new.files {
        Some(files) => Some(serde_json::to_string(files)?),
        None => None,
    };
    let origin_json = match &new.origin {
        Some(origin) => Some(serde_json::to_string(origin)?),
        None => None,
    };
    let state_json = match &new.state {
        Some(state) => Some(serde_json::to_string(state)?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO artifacts (
            id, session_id, user_id, kind, name, source, files, content,
            content_type, origin, state, storage, size,
            created_at, updated_at, deleted, deleted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
        "#,
    )
    .bind(&id)
    .bind(&new.session_id)
    .bind(&new.user_id)
    .bind(new.kind.as_str())
    .bind(&new.name)
    .bind(&new.source)
    .bind(&files_json)
    .bind(&new.content)
    .bind(&new.content_type)
    .bind(&origin_json)
    .bind(&state_json)
    .bind(new.storage.as_str())
    .bind(new.size)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Artifact {
        id,
        session_id: new.session_id,
        user_id: new.user_id,
        kind: new.kind,
        name: new.name,
        source: new.source,
        files: new.files,
        content: new.content,
        content_type: new.content_type,
        origin: new.origin,
        state: new.state,
        storage: new.storage,
        size: new.size,
        created_at: now,
        updated_at: now,
        deleted: false,
        deleted_at: None,
    })
}

/// Fetch an artifact the caller owns. Deleted records and other users'
/// records both come back as "artifact not found".
pub async fn find_artifact(pool: &SqlitePool, artifact_id: &str, user_id: &str) -> Result<Artifact> {
    let row = sqlx::query(
        "SELECT * FROM artifacts WHERE id = ? AND user_id = ? AND deleted = 0",
    )
    .bind(artifact_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or(Error::NotFound("artifact"))?;
    row_to_artifact(&row)
}

/// All live artifacts in a session, newest first.
pub async fn list_session_artifacts(
    pool: &SqlitePool,
    session_id: &str,
    user_id: &str,
) -> Result<Vec<Artifact>> {
    let rows = sqlx::query(
        "SELECT * FROM artifacts
         WHERE session_id = ? AND user_id = ? AND deleted = 0
         ORDER BY created_at DESC LIMIT 100",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_artifact).collect()
}

/// Rename — the one user-mutable field.
pub async fn rename_artifact(
    pool: &SqlitePool,
    artifact_id: &str,
    user_id: &str,
    name: &str,
) -> Result<Artifact> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE artifacts SET name = ?, updated_at = ?
         WHERE id = ? AND user_id = ? AND deleted = 0",
    )
    .bind(name)
    .bind(now)
    .bind(artifact_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound("artifact"));
    }
    find_artifact(pool, artifact_id, user_id).await
}

/// Move an asynchronous ingestion to its next lifecycle state.
pub async fn set_state(
    pool: &SqlitePool,
    artifact_id: &str,
    state: &IngestionState,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query("UPDATE artifacts SET state = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(state)?)
        .bind(now)
        .bind(artifact_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Finalize an object-stored ingestion: terminal state plus total size.
pub async fn complete_artifact(
    pool: &SqlitePool,
    artifact_id: &str,
    state: &IngestionState,
    size: i64,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query("UPDATE artifacts SET state = ?, size = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(state)?)
        .bind(size)
        .bind(now)
        .bind(artifact_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Finalize an inline ingestion: file data lands on the record itself.
pub async fn complete_artifact_inline(
    pool: &SqlitePool,
    artifact_id: &str,
    files: &[FileEntry],
    state: &IngestionState,
    size: i64,
) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        "UPDATE artifacts SET files = ?, state = ?, size = ?, updated_at = ? WHERE id = ?",
    )
    .bind(serde_json::to_string(files)?)
    .bind(serde_json::to_string(state)?)
    .bind(size)
    .bind(now)
    .bind(artifact_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn soft_delete_artifact(
    pool: &SqlitePool,
    artifact_id: &str,
    user_id: &str,
) -> Result<bool> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE artifacts SET deleted = 1, deleted_at = ?, updated_at = ?
         WHERE id = ? AND user_id = ? AND deleted = 0",
    )
    .bind(now)
    .bind(now)
    .bind(artifact_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn hard_delete_artifact(
    pool: &SqlitePool,
    artifact_id: &str,
    user_id: &str,
) -> Result<bool> {
    let result = sqlx::query("DELETE FROM artifacts WHERE id = ? AND user_id = ?")
        .bind(artifact_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Cascade: soft-delete every live artifact in a session. Returns the count.
pub async fn disable_session_artifacts(pool: &SqlitePool, session_id: &str) -> Result<u64> {
    let now = Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE artifacts SET deleted = 1, deleted_at = ?, updated_at = ?
         WHERE session_id = ? AND deleted = 0",
    )
    .bind(now)
    .bind(now)
    .bind(session_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<Artifact> {
    let kind_str: String = row.get("kind");
    let kind = ArtifactKind::parse(&kind_str)
        .ok_or_else(|| Error::validation(format!("unknown artifact kind: {}", kind_str)))?;

    let storage_str: String = row.get("storage");
    let storage = StorageKind::parse(&storage_str)
        .ok_or_else(|| Error::validation(format!("unknown storage kind: {}", storage_str)))?;

    let files: Option<Vec<FileEntry>> = match row.get::<Option<String>, _>("files") {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    let origin: Option<RepoOrigin> = match row.get::<Option<String>, _>("origin") {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    let state: Option<IngestionState> = match row.get::<Option<String>, _>("state") {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(Artifact {
        id: row.get("id"),
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        kind,
        name: row.get("name"),
        source: row.get("source"),
        files,
        content: row.get("content"),
        content_type: row.get("content_type"),
        origin,
        state,
        storage,
        size: row.get("size"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted: row.get("deleted"),
        deleted_at: row.get("deleted_at"),
    })
}
