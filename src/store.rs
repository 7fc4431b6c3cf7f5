//! Filesystem-backed object store for bulk file sets and binary uploads.
//!
//! Layout, one subtree per artifact id:
//!
//! ```text
//! <root>/repositories/<artifact_id>/<relative paths...>
//! <root>/repositories/<artifact_id>/metadata.json
//! <root>/uploads/<artifact_id>/<filename>
//! <root>/uploads/<artifact_id>/metadata.json
//! ```
//!
//! The `metadata.json` sidecar indexes a stored set without duplicating
//! content. Ids are freshly minted per ingestion, so concurrent ingestions
//! never touch the same subtree; [`ObjectStore::save_file_set`] additionally
//! refuses an id whose sidecar already exists, making id reuse an explicit
//! error instead of silent corruption.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::{FileContent, FileEntry, FilePage, FileStat};

const SIDECAR: &str = "metadata.json";

/// Sidecar for a stored repository file set. Content is indexed, not copied.
#[derive(Debug, Serialize, Deserialize)]
struct FileSetManifest {
    artifact_id: String,
    #[serde(rename = "type")]
    kind: String,
    file_count: usize,
    created_at: String,
    files: Vec<FileStat>,
}

/// Sidecar for a single uploaded blob.
#[derive(Debug, Serialize, Deserialize)]
struct UploadManifest {
    artifact_id: String,
    #[serde(rename = "type")]
    kind: String,
    filename: String,
    size: u64,
    created_at: String,
    storage_path: String,
}

/// Result of persisting a file set.
#[derive(Debug, Clone)]
pub struct SavedFileSet {
    pub files_saved: usize,
    pub total_size: u64,
    pub storage_path: String,
}

/// Result of persisting a single upload.
#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub size: u64,
    pub storage_path: String,
}

/// A stored upload read back out.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub size: u64,
}

/// Aggregate storage counters.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub repositories: usize,
    pub uploads: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the base directory layout. Idempotent.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join("repositories")).await?;
        tokio::fs::create_dir_all(self.root.join("uploads")).await?;
        info!(root = %self.root.display(), "object store initialized");
        Ok(())
    }

    fn repository_dir(&self, artifact_id: &str) -> PathBuf {
        self.root.join("repositories").join(artifact_id)
    }

    fn upload_dir(&self, artifact_id: &str) -> PathBuf {
        self.root.join("uploads").join(artifact_id)
    }

    /// Persist a filtered file set under the artifact's id.
    ///
    /// Refuses an id that already has a sidecar: one writer per id, ever.
    pub async fn save_file_set(&self, artifact_id: &str, files: &[FileEntry]) -> Result<SavedFileSet> {
        let dir = self.repository_dir(artifact_id);
        if tokio::fs::try_exists(dir.join(SIDECAR)).await? {
            return Err(Error::validation(format!(
                "artifact {} already has stored files",
                artifact_id
            )));
        }
        tokio::fs::create_dir_all(&dir).await?;

        let mut stats = Vec::with_capacity(files.len());
        let mut total_size = 0u64;

        for entry in files {
            let rel = sanitize_relative(&entry.path)?;
            let full = dir.join(&rel);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&full, entry.content.as_bytes()).await?;

            total_size += entry.size;
            stats.push(FileStat {
                path: entry.path.clone(),
                size: entry.size,
            });
        }

        let manifest = FileSetManifest {
            artifact_id: artifact_id.to_string(),
            kind: "repository".to_string(),
            file_count: stats.len(),
            created_at: Utc::now().to_rfc3339(),
            files: stats,
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(dir.join(SIDECAR), json).await?;

        info!(
            artifact_id,
            files = files.len(),
            total_size,
            "saved file set"
        );

        Ok(SavedFileSet {
            files_saved: files.len(),
            total_size,
            storage_path: format!("repositories/{}", artifact_id),
        })
    }

    /// Persist one binary blob (document upload) under the artifact's id.
    pub async fn save_upload(
        &self,
        artifact_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SavedUpload> {
        // Strip any path components from a client-supplied filename.
        let safe_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty() && n != SIDECAR)
            .ok_or_else(|| Error::validation(format!("invalid upload filename: {}", filename)))?;

        let dir = self.upload_dir(artifact_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&safe_name), bytes).await?;

        let storage_path = format!("uploads/{}/{}", artifact_id, safe_name);
        let manifest = UploadManifest {
            artifact_id: artifact_id.to_string(),
            kind: "upload".to_string(),
            filename: safe_name.clone(),
            size: bytes.len() as u64,
            created_at: Utc::now().to_rfc3339(),
            storage_path: storage_path.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        tokio::fs::write(dir.join(SIDECAR), json).await?;

        info!(artifact_id, filename = %safe_name, size = bytes.len(), "saved upload");

        Ok(SavedUpload {
            size: bytes.len() as u64,
            storage_path,
        })
    }

    /// Page through a stored file set, preserving insertion order.
    pub async fn list_files(&self, artifact_id: &str, limit: usize, offset: usize) -> Result<FilePage> {
        let manifest = self.read_file_set_manifest(artifact_id).await?;
        let total_files = manifest.files.len();

        let files = manifest
            .files
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();

        Ok(FilePage {
            total_files,
            offset,
            limit,
            files,
        })
    }

    /// Read one file out of a stored file set.
    ///
    /// Paths that resolve outside the artifact's own directory are rejected
    /// with a validation error, which is deliberately distinct from the
    /// not-found error a missing file produces.
    pub async fn read_file(&self, artifact_id: &str, path: &str) -> Result<FileContent> {
        let dir = self.repository_dir(artifact_id);
        let rel = sanitize_relative(path)?;
        let full = dir.join(&rel);

        if !tokio::fs::try_exists(&full).await? {
            return Err(Error::NotFound("file"));
        }

        // Symlink defense: the resolved path must stay inside the artifact
        // directory even after links are followed.
        let canonical_dir = tokio::fs::canonicalize(&dir).await?;
        let canonical = tokio::fs::canonicalize(&full).await?;
        if !canonical.starts_with(&canonical_dir) {
            return Err(Error::validation(format!("invalid file path: {}", path)));
        }

        let bytes = tokio::fs::read(&canonical).await?;
        let size = bytes.len() as u64;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FileContent {
            path: path.to_string(),
            content,
            size,
        })
    }

    /// Read back a stored upload: bytes, original filename, size.
    pub async fn read_upload(&self, artifact_id: &str) -> Result<StoredUpload> {
        let dir = self.upload_dir(artifact_id);
        let sidecar = dir.join(SIDECAR);
        if !tokio::fs::try_exists(&sidecar).await? {
            return Err(Error::NotFound("artifact files"));
        }

        let raw = tokio::fs::read(&sidecar).await?;
        let manifest: UploadManifest = serde_json::from_slice(&raw)?;

        let file_path = dir.join(&manifest.filename);
        if !tokio::fs::try_exists(&file_path).await? {
            return Err(Error::NotFound("file"));
        }

        let bytes = tokio::fs::read(&file_path).await?;
        let size = bytes.len() as u64;

        Ok(StoredUpload {
            filename: manifest.filename,
            bytes,
            size,
        })
    }

    /// Remove everything stored for an artifact, in whichever namespace it
    /// lives. Returns whether anything was removed; a missing id is not an
    /// error, so deletion is always safe to retry.
    pub async fn delete(&self, artifact_id: &str) -> Result<bool> {
        let repo_dir = self.repository_dir(artifact_id);
        if tokio::fs::try_exists(&repo_dir).await? {
            tokio::fs::remove_dir_all(&repo_dir).await?;
            info!(artifact_id, "deleted repository files");
            return Ok(true);
        }

        let upload_dir = self.upload_dir(artifact_id);
        if tokio::fs::try_exists(&upload_dir).await? {
            tokio::fs::remove_dir_all(&upload_dir).await?;
            info!(artifact_id, "deleted uploaded files");
            return Ok(true);
        }

        debug!(artifact_id, "no stored files to delete");
        Ok(false)
    }

    /// Count stored artifacts and total bytes on disk.
    pub fn stats(&self) -> StorageStats {
        let count_dirs = |name: &str| -> usize {
            std::fs::read_dir(self.root.join(name))
                .map(|rd| rd.filter_map(|e| e.ok()).count())
                .unwrap_or(0)
        };

        let mut total_size = 0u64;
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        StorageStats {
            repositories: count_dirs("repositories"),
            uploads: count_dirs("uploads"),
            total_size,
        }
    }

    async fn read_file_set_manifest(&self, artifact_id: &str) -> Result<FileSetManifest> {
        let sidecar = self.repository_dir(artifact_id).join(SIDECAR);
        if !tokio::fs::try_exists(&sidecar).await? {
            return Err(Error::NotFound("artifact files"));
        }
        let raw = tokio::fs::read(&sidecar).await?;
        let manifest = serde_json::from_slice(&raw)?;
        Ok(manifest)
    }
}

/// Lexically validate a storage-relative path: no absolute paths, no `..`,
/// no drive prefixes. Returns the normalized relative path.
fn sanitize_relative(path: &str) -> Result<PathBuf> {
    let p = Path::new(path);
    let mut out = PathBuf::new();
    for component in p.components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!(path, "rejected unsafe storage path");
                return Err(Error::validation(format!("invalid file path: {}", path)));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::validation(format!("invalid file path: {}", path)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(path: &str, content: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content: content.to_string(),
            size: content.len() as u64,
        }
    }

    async fn store() -> (TempDir, ObjectStore) {
        let tmp = TempDir::new().unwrap();
        let store = ObjectStore::new(tmp.path());
        store.init().await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn save_then_read_round_trip() {
        let (_tmp, store) = store().await;

        let saved = store
            .save_file_set("art-1", &[entry("a.py", "x")])
            .await
            .unwrap();
        assert_eq!(saved.files_saved, 1);
        assert_eq!(saved.total_size, 1);
        assert_eq!(saved.storage_path, "repositories/art-1");

        let file = store.read_file("art-1", "a.py").await.unwrap();
        assert_eq!(file.content, "x");
        assert_eq!(file.size, 1);

        let page = store.list_files("art-1", 10, 0).await.unwrap();
        assert_eq!(page.total_files, 1);
        assert_eq!(page.files[0].path, "a.py");
        assert_eq!(page.files[0].size, 1);
    }

    #[tokio::test]
    async fn nested_paths_create_parent_directories() {
        let (_tmp, store) = store().await;

        store
            .save_file_set("art-2", &[entry("src/deep/mod.rs", "pub mod deep;")])
            .await
            .unwrap();

        let file = store.read_file("art-2", "src/deep/mod.rs").await.unwrap();
        assert_eq!(file.content, "pub mod deep;");
    }

    #[tokio::test]
    async fn path_traversal_is_a_validation_error() {
        let (tmp, store) = store().await;

        // A real file outside the artifact directory that traversal would hit.
        std::fs::write(tmp.path().join("secret.txt"), "secret").unwrap();
        store
            .save_file_set("art-3", &[entry("a.py", "x")])
            .await
            .unwrap();

        let err = store
            .read_file("art-3", "../../secret.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {:?}", err);

        let err = store.read_file("art-3", "/etc/passwd").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_tmp, store) = store().await;
        store
            .save_file_set("art-4", &[entry("a.py", "x")])
            .await
            .unwrap();

        let err = store.read_file("art-4", "b.py").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = store.list_files("no-such-id", 10, 0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn pagination_past_the_end_is_empty_not_an_error() {
        let (_tmp, store) = store().await;
        let files: Vec<FileEntry> = (0..5)
            .map(|i| entry(&format!("f{}.rs", i), "fn main() {}"))
            .collect();
        store.save_file_set("art-5", &files).await.unwrap();

        let page = store.list_files("art-5", 10, 1000).await.unwrap();
        assert_eq!(page.total_files, 5);
        assert!(page.files.is_empty());

        let page = store.list_files("art-5", 2, 4).await.unwrap();
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.files[0].path, "f4.rs");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_tmp, store) = store().await;
        store
            .save_file_set("art-6", &[entry("a.py", "x")])
            .await
            .unwrap();

        assert!(store.delete("art-6").await.unwrap());
        assert!(!store.delete("art-6").await.unwrap());
        assert!(!store.delete("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn id_reuse_is_refused() {
        let (_tmp, store) = store().await;
        store
            .save_file_set("art-7", &[entry("a.py", "x")])
            .await
            .unwrap();

        let err = store
            .save_file_set("art-7", &[entry("b.py", "y")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn upload_round_trip() {
        let (_tmp, store) = store().await;

        let saved = store
            .save_upload("art-8", "report.pdf", b"%PDF-1.4 fake")
            .await
            .unwrap();
        assert_eq!(saved.size, 13);
        assert_eq!(saved.storage_path, "uploads/art-8/report.pdf");

        let upload = store.read_upload("art-8").await.unwrap();
        assert_eq!(upload.filename, "report.pdf");
        assert_eq!(upload.bytes, b"%PDF-1.4 fake");

        let err = store.read_upload("art-9").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn upload_filename_is_stripped_to_basename() {
        let (_tmp, store) = store().await;

        let saved = store
            .save_upload("art-10", "nested/dir/doc.pdf", b"data")
            .await
            .unwrap();
        assert_eq!(saved.storage_path, "uploads/art-10/doc.pdf");
    }

    #[tokio::test]
    async fn stats_count_both_namespaces() {
        let (_tmp, store) = store().await;
        store
            .save_file_set("r1", &[entry("a.py", "xx")])
            .await
            .unwrap();
        store.save_upload("u1", "d.pdf", b"abc").await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.repositories, 1);
        assert_eq!(stats.uploads, 1);
        assert!(stats.total_size > 0);
    }
}
