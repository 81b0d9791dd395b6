//! Wire types shared between the upload client and the chunk server.
//!
//! The server exposes five JSON endpoints (existence check, chunk upload,
//! chunk listing, merge and cleanup). Everything in this crate is plain
//! serde data; no I/O happens here.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Endpoint;
pub use messages::{
    CheckRequest, CheckResponse, ChunkListResponse, ChunkUploadResponse, CleanupResponse,
    MergeRequest, MergeResponse, ServerReply,
};
pub use types::{UploadPhase, UploadProgress, UploadResult, UploadStatus};
