//! chunkup: resumable chunked uploads from the command line.
//!
//! Usage:
//!   chunkup upload <file>      - Upload a file (resumes with --file-id)
//!   chunkup chunks <file-id>   - List chunks the server holds for an upload
//!   chunkup discard <file-id>  - Delete an unfinished upload on the server

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chunkup")]
#[command(version)]
#[command(about = "Resumable chunked file uploads")]
struct Cli {
    /// Configuration file path (defaults to ~/.config/chunkup/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Upload server base URL, e.g. http://localhost:3000/api
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file
    Upload {
        /// File to upload
        file: PathBuf,

        /// Resume an earlier upload with this id
        #[arg(long)]
        file_id: Option<String>,

        /// Chunk size in bytes, or with a K/M/G suffix
        #[arg(long, value_parser = config::parse_size)]
        chunk_size: Option<usize>,

        /// Chunks in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List chunks the server already holds for an upload
    Chunks {
        file_id: String,
    },

    /// Delete every chunk stored for an unfinished upload
    Discard {
        file_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (chunk_size, concurrent_limit) = match &cli.command {
        Command::Upload {
            chunk_size,
            concurrency,
            ..
        } => (*chunk_size, *concurrency),
        _ => (None, None),
    };
    let overrides = config::Overrides {
        server_url: cli.server.clone(),
        chunk_size,
        concurrent_limit,
    };
    let config = config::load(cli.config.as_deref(), &overrides)?;
    tracing::debug!(server = %config.server_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Upload { file, file_id, .. } => app::upload(config, file, file_id).await,
            Command::Chunks { file_id } => app::list_chunks(config, &file_id).await,
            Command::Discard { file_id } => app::discard(config, &file_id).await,
        }
    })
}
