use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the object store; `repositories/` and `uploads/` live under it.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Repository walk cutoff, counting only files that pass every filter.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Per-file size ceiling for both repository and archive ingestion.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Total decompressed-bytes ceiling for a single archive.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Clone deadline; expiry is reported as a clone failure.
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
}

fn default_max_files() -> usize {
    crate::filter::DEFAULT_MAX_FILES
}
fn default_max_file_bytes() -> u64 {
    crate::filter::MAX_FILE_SIZE
}
fn default_max_archive_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_clone_timeout_secs() -> u64 {
    300
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            max_archive_bytes: default_max_archive_bytes(),
            clone_timeout_secs: default_clone_timeout_secs(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.max_files == 0 {
        anyhow::bail!("ingest.max_files must be > 0");
    }
    if config.ingest.max_file_bytes == 0 {
        anyhow::bail!("ingest.max_file_bytes must be > 0");
    }
    if config.ingest.max_archive_bytes < config.ingest.max_file_bytes {
        anyhow::bail!("ingest.max_archive_bytes must be >= ingest.max_file_bytes");
    }
    if config.ingest.clone_timeout_secs == 0 {
        anyhow::bail!("ingest.clone_timeout_secs must be > 0");
    }

    Ok(config)
}
