//! Ingestion orchestration: the artifact creation and deletion lifecycle.
//!
//! Asynchronous sources (repository clone, archive extraction) run a
//! record-first state machine: `creating → (cloning|extracting) →
//! completed | failed`. The record always exists before any file data is
//! written, and file data is fully on disk before the record reads
//! `completed`. A failure is captured onto the same record as a terminal
//! `failed` state — never a deletion — so the user can see why ingestion
//! failed until they remove the artifact themselves.
//!
//! Document and text uploads bypass the state machine and complete
//! synchronously in one step.

use sqlx::SqlitePool;
use tracing::{error, info};

use crate::archive;
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::fetch::{self, VcsClient};
use crate::models::{Artifact, ArtifactKind, IngestionState, StorageKind};
use crate::records::{self, NewArtifact};
use crate::store::ObjectStore;

/// Ingest a remote repository into a new artifact.
///
/// Returns the completed artifact, a validation error (bad URL or missing
/// session — no record created), or an ingestion error after the record has
/// been moved to `failed`. The clone workspace is removed on every exit
/// path.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_repository(
    pool: &SqlitePool,
    store: &ObjectStore,
    vcs: &dyn VcsClient,
    limits: &IngestConfig,
    session_id: &str,
    user_id: &str,
    url: &str,
    name: Option<&str>,
) -> Result<Artifact> {
    records::find_session(pool, session_id, user_id).await?;

    let url = normalize_url(url);
    if !fetch::validate_repository_url(&url) {
        return Err(Error::validation(format!("invalid repository URL: {}", url)));
    }

    let origin = fetch::repo_origin(&url);
    let display_name = name
        .map(|n| n.to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            if origin.name.is_empty() {
                "Repository".to_string()
            } else {
                origin.name.clone()
            }
        });

    let artifact = records::insert_artifact(
        pool,
        NewArtifact {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            kind: ArtifactKind::Repository,
            name: display_name,
            source: Some(url.clone()),
            files: None,
            content: None,
            content_type: None,
            origin: Some(origin),
            state: Some(IngestionState::Cloning),
            storage: StorageKind::Object,
            size: None,
        },
    )
    .await?;

    match repository_pipeline(pool, store, vcs, limits, &artifact.id, &url).await {
        Ok(()) => records::find_artifact(pool, &artifact.id, user_id).await,
        Err(e) => {
            fail_artifact(pool, &artifact.id, &e).await;
            Err(as_ingestion(e))
        }
    }
}

/// Once the record exists, anything that goes wrong — including a raw I/O
/// failure while streaming into storage — surfaces as an ingestion error.
fn as_ingestion(err: Error) -> Error {
    match err {
        e @ Error::Ingestion(_) => e,
        other => Error::Ingestion(error_text(&other)),
    }
}

/// The fallible middle of repository ingestion: clone, filter, persist.
async fn repository_pipeline(
    pool: &SqlitePool,
    store: &ObjectStore,
    vcs: &dyn VcsClient,
    limits: &IngestConfig,
    artifact_id: &str,
    url: &str,
) -> Result<()> {
    // The outcome owns the clone workspace; dropping it on any path below
    // (including early `?` returns) removes the directory.
    let outcome = fetch::fetch_repository(vcs, url, limits).await?;

    if outcome.files.is_empty() {
        return Err(Error::ingestion("no matching files found in repository"));
    }

    let total_size: u64 = outcome.files.iter().map(|f| f.size).sum();
    let saved = store.save_file_set(artifact_id, &outcome.files).await?;

    records::complete_artifact(
        pool,
        artifact_id,
        &IngestionState::Completed {
            file_count: outcome.files.len(),
            storage_path: Some(saved.storage_path),
        },
        total_size as i64,
    )
    .await?;

    info!(
        artifact_id,
        repo = %outcome.repo_name,
        files = outcome.files.len(),
        total_size,
        "repository ingestion completed"
    );
    Ok(())
}

/// Ingest an uploaded zip archive into a new inline artifact.
///
/// Unlike repositories, an archive yielding zero matching files completes
/// successfully with `total_files = 0`: the upload was a deliberate user
/// action, not a network fetch that may have failed silently.
pub async fn ingest_archive(
    pool: &SqlitePool,
    limits: &IngestConfig,
    session_id: &str,
    user_id: &str,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<Artifact> {
    records::find_session(pool, session_id, user_id).await?;

    let artifact = records::insert_artifact(
        pool,
        NewArtifact {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            kind: ArtifactKind::Zip,
            name: filename.to_string(),
            source: Some(filename.to_string()),
            files: None,
            content: None,
            content_type: content_type.map(|s| s.to_string()),
            origin: None,
            state: Some(IngestionState::Extracting),
            storage: StorageKind::Inline,
            size: Some(bytes.len() as i64),
        },
    )
    .await?;

    let files = match archive::extract_archive(bytes, limits) {
        Ok(files) => files,
        Err(e) => {
            fail_artifact(pool, &artifact.id, &e).await;
            return Err(e);
        }
    };

    let state = IngestionState::Completed {
        file_count: files.len(),
        storage_path: None,
    };
    if let Err(e) =
        records::complete_artifact_inline(pool, &artifact.id, &files, &state, bytes.len() as i64)
            .await
    {
        fail_artifact(pool, &artifact.id, &e).await;
        return Err(e);
    }

    info!(
        artifact_id = %artifact.id,
        filename,
        files = files.len(),
        "archive ingestion completed"
    );
    records::find_artifact(pool, &artifact.id, user_id).await
}

/// Store a binary document upload (pdf, doc, or generic file) in one step.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_document(
    pool: &SqlitePool,
    store: &ObjectStore,
    session_id: &str,
    user_id: &str,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    kind: ArtifactKind,
) -> Result<Artifact> {
    if !matches!(
        kind,
        ArtifactKind::Pdf | ArtifactKind::Doc | ArtifactKind::File
    ) {
        return Err(Error::validation(format!(
            "kind {} is not a document upload",
            kind
        )));
    }

    records::find_session(pool, session_id, user_id).await?;

    let artifact = records::insert_artifact(
        pool,
        NewArtifact {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            name: filename.to_string(),
            source: Some(filename.to_string()),
            files: None,
            content: None,
            content_type: content_type.map(|s| s.to_string()),
            origin: None,
            state: None,
            storage: StorageKind::Object,
            size: Some(bytes.len() as i64),
        },
    )
    .await?;

    if let Err(e) = store.save_upload(&artifact.id, filename, bytes).await {
        // Synchronous path: no failed state to park the record in, so take
        // the placeholder back out rather than leave it pointing at nothing.
        if !matches!(
            records::hard_delete_artifact(pool, &artifact.id, user_id).await,
            Ok(true)
        ) {
            error!(artifact_id = %artifact.id, "failed to remove record after upload error");
        }
        return Err(e);
    }

    info!(artifact_id = %artifact.id, filename, size = bytes.len(), "document upload stored");
    Ok(artifact)
}

/// Store a text upload inline on the record, in one step.
pub async fn ingest_text(
    pool: &SqlitePool,
    session_id: &str,
    user_id: &str,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<Artifact> {
    records::find_session(pool, session_id, user_id).await?;

    let content = String::from_utf8_lossy(bytes).into_owned();
    records::insert_artifact(
        pool,
        NewArtifact {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            kind: ArtifactKind::Text,
            name: filename.to_string(),
            source: Some(filename.to_string()),
            files: None,
            content: Some(content),
            content_type: content_type.map(|s| s.to_string()),
            origin: None,
            state: None,
            storage: StorageKind::Inline,
            size: Some(bytes.len() as i64),
        },
    )
    .await
}

/// Dispatch an upload by its filename's extension.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_upload(
    pool: &SqlitePool,
    store: &ObjectStore,
    limits: &IngestConfig,
    session_id: &str,
    user_id: &str,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<Artifact> {
    match ArtifactKind::from_filename(filename) {
        ArtifactKind::Zip => {
            ingest_archive(pool, limits, session_id, user_id, filename, content_type, bytes).await
        }
        ArtifactKind::Text => {
            ingest_text(pool, session_id, user_id, filename, content_type, bytes).await
        }
        kind => {
            ingest_document(
                pool,
                store,
                session_id,
                user_id,
                filename,
                content_type,
                bytes,
                kind,
            )
            .await
        }
    }
}

/// Delete an artifact: soft by default, hard on request. Stored files are
/// cleaned up best-effort; a storage failure never rolls back the delete.
pub async fn delete_artifact(
    pool: &SqlitePool,
    store: &ObjectStore,
    artifact_id: &str,
    user_id: &str,
    hard: bool,
) -> Result<()> {
    let artifact = records::find_artifact(pool, artifact_id, user_id).await?;

    let removed = if hard {
        records::hard_delete_artifact(pool, artifact_id, user_id).await?
    } else {
        records::soft_delete_artifact(pool, artifact_id, user_id).await?
    };
    if !removed {
        return Err(Error::NotFound("artifact"));
    }

    if artifact.storage == StorageKind::Object {
        match store.delete(artifact_id).await {
            Ok(_) => {}
            Err(e) => {
                error!(artifact_id, error = %e, "failed to delete stored files");
            }
        }
    }

    Ok(())
}

/// Delete a session and cascade a soft-delete over its artifacts.
/// Returns how many artifacts were disabled.
pub async fn delete_session(
    pool: &SqlitePool,
    session_id: &str,
    user_id: &str,
) -> Result<u64> {
    if !records::soft_delete_session(pool, session_id, user_id).await? {
        return Err(Error::NotFound("session"));
    }

    let disabled = records::disable_session_artifacts(pool, session_id).await?;
    info!(session_id, disabled, "session deleted, artifacts disabled");
    Ok(disabled)
}

/// Best-effort transition to the terminal `failed` state. An update failure
/// is logged and swallowed so the original error keeps propagating.
async fn fail_artifact(pool: &SqlitePool, artifact_id: &str, err: &Error) {
    let state = IngestionState::Failed {
        error: error_text(err),
    };
    if let Err(update_err) = records::set_state(pool, artifact_id, &state).await {
        error!(
            artifact_id,
            error = %update_err,
            "failed to record ingestion failure"
        );
    }
}

/// The message worth persisting: the underlying cause, without the
/// taxonomy prefix.
fn error_text(err: &Error) -> String {
    match err {
        Error::Ingestion(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Prefix scheme-less host paths so `github.com/org/repo` works as input.
fn normalize_url(url: &str) -> String {
    if url.contains("://") || url.starts_with("git@") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
