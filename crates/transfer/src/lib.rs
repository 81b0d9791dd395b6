//! Chunk planning, windowed file digests and upload progress maths.
//!
//! Everything here is transport-agnostic: the uploader decides when to
//! read a chunk or hash a file, this crate only knows how.

mod digest;
mod plan;
mod progress;
mod types;
mod validation;

pub use digest::{HashAlgorithm, StreamingDigest, WindowedHasher, checksum_bytes};
pub use plan::{plan_chunks, read_chunk};
pub use progress::ProgressTracker;
pub use types::ChunkDescriptor;
pub use validation::{upload_filename, validate_file_id};

/// Default upload chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Default read window used while hashing: 2 MiB.
///
/// Independent of [`DEFAULT_CHUNK_SIZE`]; the digest always covers the
/// whole file regardless of how it is later chunked.
pub const DEFAULT_HASH_WINDOW: usize = 2 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("short read for chunk {index}: expected {expected} bytes, got {actual}")]
    ShortRead {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("hashing cancelled")]
    Cancelled,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}
