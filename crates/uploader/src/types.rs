//! Observable state of the uploader.

use std::collections::BTreeSet;

use chunkup_protocol::types::{UploadProgress, UploadStatus};

/// Snapshot published to subscribers after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadState {
    pub status: UploadStatus,
    pub progress: UploadProgress,
    /// Percentage of the file digested so far (0–100).
    pub hash_progress: f64,
    pub is_paused: bool,
    /// `true` from session start until it completes, fails or is cancelled.
    pub is_uploading: bool,
    /// Message of the last fatal error.
    pub error: Option<String>,
    pub file_id: Option<String>,
    /// Chunks the server is known to hold, including ones found on resume.
    pub uploaded_chunks: BTreeSet<usize>,
}
