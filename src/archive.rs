//! In-memory zip extraction for uploaded archives.
//!
//! Applies the same filtering policy as the repository walk (superset
//! extension list, per-file size ceiling) without ever touching disk. Entry
//! reads are bounded and a total decompressed-bytes ceiling caps the whole
//! archive, so a hostile zip cannot inflate without limit.

use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::filter;
use crate::models::FileEntry;

/// Parse archive bytes and return every entry that passes the filters.
///
/// Zero matching entries is a valid outcome, not an error; only an
/// unreadable container or a blown decompression ceiling fails.
pub fn extract_archive(bytes: &[u8], limits: &IngestConfig) -> Result<Vec<FileEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::ingestion(format!("malformed archive: {}", e)))?;

    let mut files = Vec::new();
    let mut total_bytes = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::ingestion(format!("malformed archive: {}", e)))?;

        if entry.is_dir() {
            continue;
        }

        // Entries with absolute or parent-traversing names are dropped.
        let path = match entry.enclosed_name() {
            Some(p) => p,
            None => {
                warn!(name = entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };
        let rel = path.to_string_lossy().to_string();

        if entry.size() > limits.max_file_bytes {
            debug!(path = %rel, size = entry.size(), "skipping large archive entry");
            continue;
        }
        if !filter::archive_ext_allowed(Path::new(&rel)) {
            continue;
        }

        // Bounded read: never trust the declared size.
        let mut raw = Vec::new();
        entry
            .take(limits.max_file_bytes + 1)
            .read_to_end(&mut raw)
            .map_err(|e| Error::ingestion(format!("malformed archive: {}", e)))?;
        if raw.len() as u64 > limits.max_file_bytes {
            debug!(path = %rel, "skipping archive entry that inflated past the size ceiling");
            continue;
        }

        total_bytes += raw.len() as u64;
        if total_bytes > limits.max_archive_bytes {
            return Err(Error::ingestion(format!(
                "archive exceeds extraction ceiling ({} bytes)",
                limits.max_archive_bytes
            )));
        }

        let size = raw.len() as u64;
        let content = String::from_utf8_lossy(&raw).into_owned();
        files.push(FileEntry {
            path: rel,
            content,
            size,
        });
    }

    Ok(files)
}
