//! # Attache CLI
//!
//! The `attache` binary is the in-repo consumer of the artifact core. It
//! provides commands for database initialization, session management,
//! repository and upload ingestion, file access, and storage statistics.
//!
//! ## Usage
//!
//! ```bash
//! attache --config ./config/attache.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `attache init` | Create the SQLite database and storage layout |
//! | `attache new-session --user <id>` | Create a chat session |
//! | `attache add-repo <session> <url> --user <id>` | Clone and ingest a repository |
//! | `attache upload <session> <path> --user <id>` | Ingest a zip/document/text upload |
//! | `attache artifacts <session> --user <id>` | List a session's artifacts |
//! | `attache files <artifact> --user <id>` | Page through an artifact's files |
//! | `attache cat <artifact> <path> --user <id>` | Print one file's content |
//! | `attache download <artifact> --user <id>` | Write a stored document to disk |
//! | `attache rm <artifact> --user <id>` | Delete an artifact (soft by default) |
//! | `attache rm-session <session> --user <id>` | Delete a session and its artifacts |
//! | `attache stats` | Show object store counters |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use attache::config::{self, Config};
use attache::fetch::GitCli;
use attache::store::ObjectStore;
use attache::{db, ingest, migrate, query, records};

/// Attache — artifact ingestion backend for chat sessions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/attache.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "attache",
    about = "Attache — artifact ingestion for chat sessions (repositories, archives, documents)",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/attache.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and storage directories.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Create a chat session to attach artifacts to.
    NewSession {
        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Session title.
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Clone a repository and ingest its source files.
    AddRepo {
        /// Session id.
        session: String,

        /// Repository URL (https, git, ssh, or scp-like).
        url: String,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Display name override; defaults to the repository name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Ingest an uploaded file (zip, pdf, doc, text, or other).
    Upload {
        /// Session id.
        session: String,

        /// Path of the file to upload.
        path: PathBuf,

        /// Owning user id.
        #[arg(long)]
        user: String,
    },

    /// List a session's artifacts, newest first.
    Artifacts {
        /// Session id.
        session: String,

        /// Owning user id.
        #[arg(long)]
        user: String,
    },

    /// Page through an artifact's file listing.
    Files {
        /// Artifact id.
        artifact: String,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Maximum entries per page.
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Entries to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Print one file's content from an artifact.
    Cat {
        /// Artifact id.
        artifact: String,

        /// Relative file path inside the artifact.
        path: String,

        /// Owning user id.
        #[arg(long)]
        user: String,
    },

    /// Write a stored document upload back to disk.
    Download {
        /// Artifact id.
        artifact: String,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Output path; defaults to the stored filename.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Delete an artifact and its stored files.
    Rm {
        /// Artifact id.
        artifact: String,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Remove the record permanently instead of soft-deleting.
        #[arg(long)]
        hard: bool,
    },

    /// Delete a session, disabling all of its artifacts.
    RmSession {
        /// Session id.
        session: String,

        /// Owning user id.
        #[arg(long)]
        user: String,
    },

    /// Show object store counters.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::NewSession { user, title } => run_new_session(&config, &user, &title).await,
        Commands::AddRepo {
            session,
            url,
            user,
            name,
        } => run_add_repo(&config, &session, &user, &url, name.as_deref()).await,
        Commands::Upload {
            session,
            path,
            user,
        } => run_upload(&config, &session, &user, &path).await,
        Commands::Artifacts { session, user } => run_artifacts(&config, &session, &user).await,
        Commands::Files {
            artifact,
            user,
            limit,
            offset,
        } => run_files(&config, &artifact, &user, limit, offset).await,
        Commands::Cat {
            artifact,
            path,
            user,
        } => run_cat(&config, &artifact, &user, &path).await,
        Commands::Download {
            artifact,
            user,
            out,
        } => run_download(&config, &artifact, &user, out).await,
        Commands::Rm {
            artifact,
            user,
            hard,
        } => run_rm(&config, &artifact, &user, hard).await,
        Commands::RmSession { session, user } => run_rm_session(&config, &session, &user).await,
        Commands::Stats => run_stats(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    ObjectStore::new(&config.storage.root).init().await?;
    pool.close().await;
    println!("initialized");
    Ok(())
}

async fn run_new_session(config: &Config, user: &str, title: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let session = records::create_session(&pool, user, title).await?;
    pool.close().await;
    println!("{}", session.id);
    Ok(())
}

async fn run_add_repo(
    config: &Config,
    session: &str,
    user: &str,
    url: &str,
    name: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    store.init().await?;
    let vcs = GitCli::new(Duration::from_secs(config.ingest.clone_timeout_secs));

    let artifact = ingest::ingest_repository(
        &pool,
        &store,
        &vcs,
        &config.ingest,
        session,
        user,
        url,
        name,
    )
    .await?;
    pool.close().await;

    println!("artifact:  {}", artifact.id);
    println!("name:      {}", artifact.name);
    if let Some(state) = &artifact.state {
        println!("state:     {}", serde_json::to_string(state)?);
    }
    if let Some(size) = artifact.size {
        println!("size:      {} bytes", size);
    }
    Ok(())
}

async fn run_upload(config: &Config, session: &str, user: &str, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("upload path has no filename: {}", path.display()))?;
    let bytes = std::fs::read(path)?;

    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    store.init().await?;

    let artifact = ingest::ingest_upload(
        &pool,
        &store,
        &config.ingest,
        session,
        user,
        &filename,
        content_type_for(path),
        &bytes,
    )
    .await?;
    pool.close().await;

    println!("artifact:  {}", artifact.id);
    println!("kind:      {}", artifact.kind);
    println!("storage:   {}", artifact.storage.as_str());
    Ok(())
}

async fn run_artifacts(config: &Config, session: &str, user: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let artifacts = records::list_session_artifacts(&pool, session, user).await?;
    pool.close().await;

    println!("{:<38} {:<12} {:<10} NAME", "ID", "KIND", "STORAGE");
    for artifact in artifacts {
        println!(
            "{:<38} {:<12} {:<10} {}",
            artifact.id,
            artifact.kind.as_str(),
            artifact.storage.as_str(),
            artifact.name
        );
    }
    Ok(())
}

async fn run_files(
    config: &Config,
    artifact: &str,
    user: &str,
    limit: usize,
    offset: usize,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    let listing = query::list_files(&pool, &store, artifact, user, limit, offset).await?;
    pool.close().await;

    println!(
        "{} ({}) — {} files, showing {} from offset {}",
        listing.artifact_name,
        listing.artifact_kind,
        listing.page.total_files,
        listing.page.files.len(),
        listing.page.offset
    );
    for file in listing.page.files {
        println!("{:>10}  {}", file.size, file.path);
    }
    Ok(())
}

async fn run_cat(config: &Config, artifact: &str, user: &str, path: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    let file = query::file_content(&pool, &store, artifact, user, path).await?;
    pool.close().await;

    print!("{}", file.content);
    Ok(())
}

async fn run_download(
    config: &Config,
    artifact: &str,
    user: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    let download = query::download(&pool, &store, artifact, user).await?;
    pool.close().await;

    let out = out.unwrap_or_else(|| PathBuf::from(&download.filename));
    std::fs::write(&out, &download.bytes)?;
    println!(
        "wrote {} ({} bytes, {})",
        out.display(),
        download.bytes.len(),
        download.content_type
    );
    Ok(())
}

async fn run_rm(config: &Config, artifact: &str, user: &str, hard: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = ObjectStore::new(&config.storage.root);
    ingest::delete_artifact(&pool, &store, artifact, user, hard).await?;
    pool.close().await;
    println!("deleted");
    Ok(())
}

async fn run_rm_session(config: &Config, session: &str, user: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let disabled = ingest::delete_session(&pool, session, user).await?;
    pool.close().await;
    println!("session deleted, {} artifacts disabled", disabled);
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let stats = ObjectStore::new(&config.storage.root).stats();
    println!("repositories: {}", stats.repositories);
    println!("uploads:      {}", stats.uploads);
    println!("total size:   {} bytes", stats.total_size);
    Ok(())
}

fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "zip" => Some("application/zip"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        _ => None,
    }
}
