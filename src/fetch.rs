//! Repository fetching: URL validation, shallow clone, filtered walk.
//!
//! Workflow:
//! 1. Validate that the URL plausibly names a reachable repository —
//!    without touching the network.
//! 2. Shallow-clone (depth 1, single branch) into a transient [`Workspace`].
//! 3. Walk the tree, pruning ignored directories and applying the
//!    extension/size filters, up to the configured file cutoff.
//!
//! The caller receives the file list together with the still-live workspace
//! handle; the workspace directory is removed when the handle drops, on
//! every exit path. Only the clone step produces a hard failure — filtering
//! decisions never do.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::filter;
use crate::models::{FileEntry, RepoOrigin};

/// Hosting domains recognized by [`validate_repository_url`].
const GIT_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "git.sr.ht",
    "codeberg.org",
    "gitea.io",
];

/// A clone failure, carrying the underlying tool's diagnostic.
#[derive(Debug, ThisError)]
#[error("{0}")]
pub struct CloneError(pub String);

/// The one operation the core needs from a version-control client.
#[async_trait]
pub trait VcsClient: Send + Sync {
    async fn shallow_clone(&self, url: &str, dest: &Path) -> std::result::Result<(), CloneError>;
}

/// Production [`VcsClient`]: shells out to `git clone --depth 1`.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl VcsClient for GitCli {
    async fn shallow_clone(&self, url: &str, dest: &Path) -> std::result::Result<(), CloneError> {
        let mut cmd = tokio::process::Command::new("git");
        cmd.args(["clone", "--depth", "1", "--single-branch"])
            .arg(url)
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(CloneError(format!(
                    "git clone timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                return Err(CloneError(format!(
                    "failed to execute 'git clone' (is git installed?): {}",
                    e
                )))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloneError(format!("git clone failed: {}", stderr.trim())));
        }

        Ok(())
    }
}

/// Transient clone directory with guaranteed removal.
///
/// Dropping the workspace deletes the directory on every exit path,
/// including panics; a removal failure is logged and never propagated.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::with_prefix("repo-")?;
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove clone workspace");
            } else {
                debug!(path = %path.display(), "removed clone workspace");
            }
        }
    }
}

/// Everything the fetcher hands back to the orchestrator.
#[derive(Debug)]
pub struct FetchOutcome {
    pub files: Vec<FileEntry>,
    pub repo_name: String,
    pub truncated: bool,
    /// Kept alive so the caller controls when the clone directory goes away.
    pub workspace: Workspace,
}

/// Whether a URL plausibly names a reachable repository. Purely syntactic.
pub fn validate_repository_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    let lower = url.to_lowercase();
    if GIT_HOSTS.iter().any(|host| lower.contains(host)) {
        return true;
    }
    if lower.ends_with(".git") {
        return true;
    }

    ["http://", "https://", "git://", "ssh://", "git@"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Display name for a repository: the URL's final path segment minus `.git`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let last = last.rsplit(':').next().unwrap_or(last);
    last.trim_end_matches(".git").to_string()
}

/// Host/owner/name info parsed from a repository URL.
pub fn repo_origin(url: &str) -> RepoOrigin {
    let trimmed = url.trim_end_matches('/');
    let name = repo_name_from_url(trimmed);

    let mut segments = trimmed.rsplit('/');
    let _ = segments.next();
    let owner = segments
        .next()
        .map(|s| s.rsplit(':').next().unwrap_or(s).to_string())
        .unwrap_or_default();

    let lower = trimmed.to_lowercase();
    let host = if lower.contains("github.com") {
        "GitHub"
    } else if lower.contains("gitlab.com") {
        "GitLab"
    } else if lower.contains("bitbucket.org") {
        "Bitbucket"
    } else {
        "Git"
    };

    RepoOrigin {
        name,
        host: host.to_string(),
        owner,
    }
}

/// Clone a repository and collect its filtered files.
///
/// A clone failure surfaces as an ingestion error carrying the tool's
/// diagnostic; the workspace is already gone by the time the error returns.
pub async fn fetch_repository(
    vcs: &dyn VcsClient,
    url: &str,
    limits: &IngestConfig,
) -> Result<FetchOutcome> {
    if !validate_repository_url(url) {
        return Err(Error::validation(format!("invalid repository URL: {}", url)));
    }

    let workspace = Workspace::new()?;
    info!(url, workspace = %workspace.path().display(), "cloning repository");

    vcs.shallow_clone(url, workspace.path())
        .await
        .map_err(|e| Error::ingestion(e.to_string()))?;

    let (files, truncated) = collect_files(workspace.path(), limits)?;
    info!(url, files = files.len(), truncated, "extracted repository files");

    Ok(FetchOutcome {
        files,
        repo_name: repo_name_from_url(url),
        truncated,
        workspace,
    })
}

/// Walk a cloned tree applying the filtering policy.
fn collect_files(root: &Path, limits: &IngestConfig) -> Result<(Vec<FileEntry>, bool)> {
    let exclude = filter::ignored_dir_globset()?;

    let mut files = Vec::new();
    let mut truncated = false;

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        !exclude.is_match(rel)
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !filter::source_ext_allowed(path) {
            continue;
        }

        if files.len() >= limits.max_files {
            warn!(max_files = limits.max_files, "reached max files limit");
            truncated = true;
            break;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if size > limits.max_file_bytes {
            debug!(path = %path.display(), size, "skipping large file");
            continue;
        }

        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                continue;
            }
        };

        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        files.push(FileEntry {
            path: rel,
            content: String::from_utf8_lossy(&raw).into_owned(),
            size,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((files, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FakeVcs {
        files: Vec<(String, Vec<u8>)>,
    }

    #[async_trait]
    impl VcsClient for FakeVcs {
        async fn shallow_clone(
            &self,
            _url: &str,
            dest: &Path,
        ) -> std::result::Result<(), CloneError> {
            for (path, content) in &self.files {
                let full = dest.join(path);
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(full, content).unwrap();
            }
            Ok(())
        }
    }

    struct FailingVcs;

    #[async_trait]
    impl VcsClient for FailingVcs {
        async fn shallow_clone(
            &self,
            _url: &str,
            _dest: &Path,
        ) -> std::result::Result<(), CloneError> {
            Err(CloneError(
                "git clone failed: repository 'https://github.com/a/b' not found".to_string(),
            ))
        }
    }

    fn limits() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn url_validation() {
        assert!(validate_repository_url("https://github.com/rust-lang/rust"));
        assert!(validate_repository_url("git@gitlab.com:group/project.git"));
        assert!(validate_repository_url("https://example.org/some/repo.git"));
        assert!(validate_repository_url("git://host/repo"));
        assert!(!validate_repository_url(""));
        assert!(!validate_repository_url("example.org/plain/page"));
        assert!(!validate_repository_url("ftp://example.org/repo"));
    }

    #[test]
    fn repo_name_derivation() {
        assert_eq!(repo_name_from_url("https://github.com/a/widget.git"), "widget");
        assert_eq!(repo_name_from_url("https://github.com/a/widget/"), "widget");
        assert_eq!(repo_name_from_url("git@github.com:a/widget.git"), "widget");
    }

    #[test]
    fn origin_parsing() {
        let origin = repo_origin("https://github.com/octo/widget.git");
        assert_eq!(origin.name, "widget");
        assert_eq!(origin.owner, "octo");
        assert_eq!(origin.host, "GitHub");

        let origin = repo_origin("https://example.org/team/thing.git");
        assert_eq!(origin.host, "Git");
        assert_eq!(origin.owner, "team");
    }

    #[tokio::test]
    async fn filters_by_extension_size_and_directory() {
        let vcs = FakeVcs {
            files: vec![
                ("src/main.rs".to_string(), b"fn main() {}".to_vec()),
                ("README.md".to_string(), b"# hi".to_vec()),
                ("logo.png".to_string(), b"\x89PNG".to_vec()),
                ("node_modules/pkg/index.js".to_string(), b"x".to_vec()),
                (".git/config".to_string(), b"[core]".to_vec()),
                (
                    "big.txt".to_string(),
                    vec![b'a'; (filter::MAX_FILE_SIZE + 1) as usize],
                ),
            ],
        };

        let outcome = fetch_repository(&vcs, "https://github.com/a/b.git", &limits())
            .await
            .unwrap();

        let paths: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
        assert!(!outcome.truncated);
        assert_eq!(outcome.repo_name, "b");
    }

    #[tokio::test]
    async fn max_file_cutoff_is_exact() {
        let files = (0..12)
            .map(|i| (format!("f{:03}.rs", i), b"x".to_vec()))
            .collect();
        let vcs = FakeVcs { files };

        let mut cfg = limits();
        cfg.max_files = 10;
        let outcome = fetch_repository(&vcs, "https://github.com/a/b.git", &cfg)
            .await
            .unwrap();
        assert_eq!(outcome.files.len(), 10);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn invalid_url_fails_without_cloning() {
        let err = fetch_repository(&FailingVcs, "not-a-repo", &limits())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn clone_failure_carries_the_diagnostic() {
        let err = fetch_repository(&FailingVcs, "https://github.com/a/b.git", &limits())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn workspace_is_removed_on_drop() {
        let workspace = Workspace::new().unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(path.join("probe.txt"), "x").unwrap();
        assert!(path.exists());
        drop(workspace);
        assert!(!path.exists());
    }
}
