//! Resumable chunked file uploads.
//!
//! This crate implements the upload flow on top of an abstract
//! [`UploadTransport`]; [`HttpTransport`] is the reqwest-backed
//! implementation used by the CLI.
//!
//! # Pipeline
//!
//! 1. **Hash**: digest the whole file on the background worker pool
//! 2. **Check**: skip the transfer when the server already has the hash
//! 3. **Plan**: split the file into fixed-size chunks, seeding from the
//!    chunks the server already holds
//! 4. **Upload**: send missing chunks with bounded concurrency, retries
//!    and pause/resume
//! 5. **Merge**: ask the server to assemble the file
//!
//! ```ignore
//! let uploader = Uploader::with_http(UploaderConfig::default(), UploadCallbacks::default())?;
//! let result = uploader.upload_file("movie.mp4").await?;
//! println!("stored at {}", result.path);
//! ```

pub mod config;
pub mod error;
pub mod hashing;
pub mod http;
pub mod orchestrator;
mod session;
pub mod transport;
pub mod types;

pub use chunkup_protocol::types::{UploadPhase, UploadProgress, UploadResult, UploadStatus};
pub use chunkup_worker_pool::PoolStatus;
pub use config::{UploadCallbacks, UploadOptions, UploaderConfig};
pub use error::{HashError, TransportError, UploadError};
pub use hashing::{HASH_TASK, HashingService, register_hash_handler};
pub use http::HttpTransport;
pub use orchestrator::{Uploader, generate_file_id};
pub use transport::{ChunkProgress, TransportFuture, UploadTransport};
pub use types::UploadState;
