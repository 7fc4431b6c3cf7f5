//! Read-side operations over artifacts: file listings, single-file
//! content, and raw downloads.
//!
//! Where an artifact's data lives is captured once as a [`FileSource`]
//! instead of being re-derived from a storage tag at every call site.
//! Ownership is enforced by the record lookup itself: an artifact owned by
//! someone else produces the same not-found as a nonexistent id.

use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::{
    Artifact, ArtifactKind, FileContent, FilePage, FileEntry, FileStat, StorageKind,
};
use crate::records;
use crate::store::ObjectStore;

/// Where an artifact's files can be read from.
pub enum FileSource {
    /// Small/legacy artifacts: the record's own `files` array.
    Inline(Vec<FileEntry>),
    /// Bulk artifacts: the object store subtree keyed by the artifact id.
    Object(String),
}

impl FileSource {
    pub fn of(artifact: &Artifact) -> FileSource {
        match artifact.storage {
            StorageKind::Object => FileSource::Object(artifact.id.clone()),
            StorageKind::Inline => {
                FileSource::Inline(artifact.files.clone().unwrap_or_default())
            }
        }
    }

    /// One page of the file listing, insertion order preserved. An offset
    /// past the end yields an empty page, not an error.
    pub async fn list(&self, store: &ObjectStore, limit: usize, offset: usize) -> Result<FilePage> {
        match self {
            FileSource::Object(id) => store.list_files(id, limit, offset).await,
            FileSource::Inline(files) => Ok(FilePage {
                total_files: files.len(),
                offset,
                limit,
                files: files
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|f| FileStat {
                        path: f.path.clone(),
                        size: f.size,
                    })
                    .collect(),
            }),
        }
    }

    /// A single file's content by relative path.
    pub async fn read(&self, store: &ObjectStore, path: &str) -> Result<FileContent> {
        match self {
            FileSource::Object(id) => store.read_file(id, path).await,
            FileSource::Inline(files) => files
                .iter()
                .find(|f| f.path == path)
                .map(|f| FileContent {
                    path: f.path.clone(),
                    content: f.content.clone(),
                    size: f.size,
                })
                .ok_or(Error::NotFound("file")),
        }
    }
}

/// A file listing page together with the identifying bits of its artifact.
#[derive(Debug)]
pub struct ArtifactFiles {
    pub artifact_id: String,
    pub artifact_name: String,
    pub artifact_kind: ArtifactKind,
    pub page: FilePage,
}

/// A raw download: the stored bytes plus the recorded content type.
#[derive(Debug)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub async fn list_files(
    pool: &SqlitePool,
    store: &ObjectStore,
    artifact_id: &str,
    user_id: &str,
    limit: usize,
    offset: usize,
) -> Result<ArtifactFiles> {
    let artifact = records::find_artifact(pool, artifact_id, user_id).await?;
    let page = FileSource::of(&artifact).list(store, limit, offset).await?;

    Ok(ArtifactFiles {
        artifact_id: artifact.id,
        artifact_name: artifact.name,
        artifact_kind: artifact.kind,
        page,
    })
}

pub async fn file_content(
    pool: &SqlitePool,
    store: &ObjectStore,
    artifact_id: &str,
    user_id: &str,
    path: &str,
) -> Result<FileContent> {
    let artifact = records::find_artifact(pool, artifact_id, user_id).await?;
    FileSource::of(&artifact).read(store, path).await
}

/// Raw bytes of a stored document upload. Only `pdf` and `doc` artifacts in
/// the object store are downloadable; anything else is a usage error, not a
/// not-found.
pub async fn download(
    pool: &SqlitePool,
    store: &ObjectStore,
    artifact_id: &str,
    user_id: &str,
) -> Result<Download> {
    let artifact = records::find_artifact(pool, artifact_id, user_id).await?;

    let downloadable = matches!(artifact.kind, ArtifactKind::Pdf | ArtifactKind::Doc)
        && artifact.storage == StorageKind::Object;
    if !downloadable {
        return Err(Error::Unsupported(format!(
            "artifact type {} not supported for download",
            artifact.kind
        )));
    }

    let upload = store.read_upload(artifact_id).await?;
    Ok(Download {
        filename: upload.filename,
        content_type: artifact
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        bytes: upload.bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inline_source(n: usize) -> FileSource {
        FileSource::Inline(
            (0..n)
                .map(|i| FileEntry {
                    path: format!("f{}.rs", i),
                    content: format!("// {}", i),
                    size: 4,
                })
                .collect(),
        )
    }

    fn scratch_store() -> (TempDir, ObjectStore) {
        let tmp = TempDir::new().unwrap();
        let store = ObjectStore::new(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn inline_pagination_clamps_to_bounds() {
        let (_tmp, store) = scratch_store();
        let source = inline_source(5);

        let page = source.list(&store, 10, 1000).await.unwrap();
        assert_eq!(page.total_files, 5);
        assert!(page.files.is_empty());

        let page = source.list(&store, 2, 4).await.unwrap();
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].path, "f4.rs");
    }

    #[tokio::test]
    async fn inline_read_scans_by_path() {
        let (_tmp, store) = scratch_store();
        let source = inline_source(3);

        let file = source.read(&store, "f1.rs").await.unwrap();
        assert_eq!(file.content, "// 1");

        let err = source.read(&store, "missing.rs").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn artifact_without_inline_files_lists_empty() {
        let (_tmp, store) = scratch_store();
        let source = FileSource::Inline(Vec::new());

        let page = source.list(&store, 10, 0).await.unwrap();
        assert_eq!(page.total_files, 0);
        assert!(page.files.is_empty());
    }
}
