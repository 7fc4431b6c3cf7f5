//! Shared file-filtering policy for repository and archive ingestion.
//!
//! Both paths apply the same rules: a fixed allow-list of source/text
//! extensions, a per-file size ceiling, and (for repository walks) a fixed
//! set of directory names that are pruned outright. Filtering never fails an
//! ingestion; files that miss the policy are silently skipped.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::{Error, Result};

/// Per-file size ceiling. Files above this are skipped, not truncated.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Default cutoff for repository walks, counting only files that pass
/// every other filter.
pub const DEFAULT_MAX_FILES: usize = 500;

/// Directory names pruned during repository walks: version-control
/// internals, dependency caches, build output, IDE state.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "venv",
    "env",
    ".env",
    "virtualenv",
    ".venv",
    "dist",
    "build",
    ".idea",
    ".vscode",
    ".vs",
    "target",
    "bin",
    "obj",
    "out",
    "coverage",
    ".nyc_output",
    ".next",
    ".nuxt",
    "vendor",
];

/// Extensions accepted from repository walks: common programming languages,
/// config, and doc formats.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "tsx", "jsx", "java", "cpp", "c", "h", "hpp", "cs", "go", "rs", "rb", "php",
    "swift", "kt", "scala", "sql", "html", "css", "json", "xml", "yaml", "yml", "md", "txt", "sh",
    "bash", "r", "m", "vue", "svelte", "dart", "lua", "pl", "pm", "gradle", "proto", "thrift",
];

/// Extra formats accepted from archives on top of [`SOURCE_EXTENSIONS`].
pub const ARCHIVE_EXTRA_EXTENSIONS: &[&str] = &["toml", "ini", "cfg", "csv", "rst"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Whether a repository file passes the extension allow-list.
pub fn source_ext_allowed(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => SOURCE_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// Whether an archive entry passes the (superset) extension allow-list.
pub fn archive_ext_allowed(path: &Path) -> bool {
    match extension_of(path) {
        Some(ext) => {
            SOURCE_EXTENSIONS.contains(&ext.as_str())
                || ARCHIVE_EXTRA_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Build the exclude set matching any path that sits under an ignored
/// directory name, at any depth.
pub fn ignored_dir_globset() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for name in IGNORED_DIRS {
        builder.add(glob(&format!("**/{}", name))?);
        builder.add(glob(&format!("**/{}/**", name))?);
    }
    builder
        .build()
        .map_err(|e| Error::validation(format!("bad ignore pattern set: {}", e)))
}

fn glob(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|e| Error::validation(format!("bad ignore pattern: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extension_allow_list() {
        assert!(source_ext_allowed(Path::new("src/main.rs")));
        assert!(source_ext_allowed(Path::new("README.md")));
        assert!(source_ext_allowed(Path::new("Config.YAML")));
        assert!(!source_ext_allowed(Path::new("photo.png")));
        assert!(!source_ext_allowed(Path::new("binary.exe")));
        assert!(!source_ext_allowed(Path::new("Makefile")));
    }

    #[test]
    fn archive_list_is_a_superset() {
        for ext in SOURCE_EXTENSIONS {
            let p = format!("f.{}", ext);
            assert!(archive_ext_allowed(Path::new(&p)), "missing {}", ext);
        }
        assert!(archive_ext_allowed(Path::new("Cargo.toml")));
        assert!(archive_ext_allowed(Path::new("data.csv")));
        assert!(!source_ext_allowed(Path::new("Cargo.toml")));
    }

    #[test]
    fn ignored_dirs_match_at_any_depth() {
        let set = ignored_dir_globset().unwrap();
        assert!(set.is_match("node_modules"));
        assert!(set.is_match("node_modules/lodash/index.js"));
        assert!(set.is_match("packages/app/node_modules/x.js"));
        assert!(set.is_match(".git/HEAD"));
        assert!(set.is_match("a/b/target/debug/build.rs"));
        assert!(!set.is_match("src/lib.rs"));
        assert!(!set.is_match("docs/build.md"));
    }
}
