//! Core data models for artifacts and sessions.
//!
//! An [`Artifact`] is a user-attached content bundle (repository clone, zip
//! archive, document upload, or text snippet) linked to exactly one chat
//! session and one user. File data lives either inline on the record
//! (small/legacy artifacts) or in the filesystem object store, never both.

use serde::{Deserialize, Serialize};

/// What kind of content an artifact carries. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Repository,
    Zip,
    Pdf,
    Doc,
    Text,
    File,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Repository => "repository",
            ArtifactKind::Zip => "zip",
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Doc => "doc",
            ArtifactKind::Text => "text",
            ArtifactKind::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<ArtifactKind> {
        match s {
            "repository" => Some(ArtifactKind::Repository),
            "zip" => Some(ArtifactKind::Zip),
            "pdf" => Some(ArtifactKind::Pdf),
            "doc" => Some(ArtifactKind::Doc),
            "text" => Some(ArtifactKind::Text),
            "file" => Some(ArtifactKind::File),
            _ => None,
        }
    }

    /// Classify an uploaded file by its extension. Unrecognized extensions
    /// fall back to the generic `file` kind.
    pub fn from_filename(filename: &str) -> ArtifactKind {
        let ext = std::path::Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => ArtifactKind::Zip,
            "pdf" => ArtifactKind::Pdf,
            "doc" | "docx" => ArtifactKind::Doc,
            "txt" | "md" => ArtifactKind::Text,
            _ => ArtifactKind::File,
        }
    }

    /// Kinds that go through the asynchronous fetch/extract state machine.
    pub fn has_lifecycle(&self) -> bool {
        matches!(self, ArtifactKind::Repository | ArtifactKind::Zip)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact's file data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Data held directly on the record (`files` or `content`).
    Inline,
    /// Data held in the filesystem object store under the artifact id.
    Object,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Inline => "inline",
            StorageKind::Object => "object",
        }
    }

    pub fn parse(s: &str) -> Option<StorageKind> {
        match s {
            "inline" => Some(StorageKind::Inline),
            "object" => Some(StorageKind::Object),
            _ => None,
        }
    }
}

/// Lifecycle of an asynchronous ingestion (repository clone or archive
/// extraction). Absent on kinds that complete synchronously.
///
/// `failed` is terminal: the record is never retried, only deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestionState {
    Cloning,
    Extracting,
    Completed {
        file_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        storage_path: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl IngestionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestionState::Completed { .. } | IngestionState::Failed { .. }
        )
    }
}

/// One file produced by the fetcher or extractor: relative path, lossily
/// decoded UTF-8 content, and the original byte size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    pub size: u64,
}

/// Path and size only — what listings and sidecar manifests carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub path: String,
    pub size: u64,
}

/// One page of a file listing.
#[derive(Debug, Clone, Serialize)]
pub struct FilePage {
    pub total_files: usize,
    pub offset: usize,
    pub limit: usize,
    pub files: Vec<FileStat>,
}

/// A single file's content as returned by the query layer.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub size: u64,
}

/// Origin info parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOrigin {
    pub name: String,
    pub host: String,
    pub owner: String,
}

/// The central record: a user-attached content bundle tied to a session.
///
/// Invariants:
/// - `session_id`/`user_id` never change after creation.
/// - `storage == Object` implies `files` and `content` are `None`; the data
///   lives in the object store under `id`.
/// - `state` is present only for kinds with an asynchronous lifecycle.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
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
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
}

/// A chat session. The core only consults it as an ownership guard and as
/// the root of cascading soft-deletes.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted: bool,
    pub deleted_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_filename_maps_known_extensions() {
        assert_eq!(ArtifactKind::from_filename("a.zip"), ArtifactKind::Zip);
        assert_eq!(ArtifactKind::from_filename("b.PDF"), ArtifactKind::Pdf);
        assert_eq!(ArtifactKind::from_filename("c.docx"), ArtifactKind::Doc);
        assert_eq!(ArtifactKind::from_filename("notes.md"), ArtifactKind::Text);
        assert_eq!(ArtifactKind::from_filename("blob.bin"), ArtifactKind::File);
        assert_eq!(ArtifactKind::from_filename("noext"), ArtifactKind::File);
    }

    #[test]
    fn ingestion_state_round_trips_through_json() {
        let state = IngestionState::Completed {
            file_count: 42,
            storage_path: Some("repositories/abc".to_string()),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: IngestionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);

        let failed = IngestionState::Failed {
            error: "git clone failed: repository not found".to_string(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains(r#""status":"failed""#));
    }

    #[test]
    fn cloning_state_serializes_as_plain_tag() {
        let json = serde_json::to_string(&IngestionState::Cloning).unwrap();
        assert_eq!(json, r#"{"status":"cloning"}"#);
    }
}
