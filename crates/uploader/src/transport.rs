//! Transport trait between the upload flow and the chunk server.
//!
//! `HttpTransport` implements it over reqwest; tests use in-memory mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chunkup_protocol::messages::{
    CheckResponse, ChunkListResponse, ChunkUploadResponse, CleanupResponse, MergeRequest,
    MergeResponse,
};

use crate::error::TransportError;

/// Receives the percentage (0–100) of one chunk's body sent so far.
pub type ChunkProgress = Arc<dyn Fn(f64) + Send + Sync>;

/// Boxed future returned by every transport call.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Abstract connection to the upload server.
///
/// Implementations must reject missing identifiers with
/// [`TransportError::InvalidRequest`] before touching the network, and must
/// turn a `success: false` reply into an error. Dropping a returned future
/// aborts the request.
pub trait UploadTransport: Send + Sync {
    /// Asks whether a file with `file_hash` is already stored.
    fn check_exists(&self, file_hash: &str, filename: &str) -> TransportFuture<'_, CheckResponse>;

    /// Sends one chunk's bytes.
    fn upload_chunk(
        &self,
        file_id: &str,
        chunk_index: usize,
        data: Vec<u8>,
        on_progress: Option<ChunkProgress>,
    ) -> TransportFuture<'_, ChunkUploadResponse>;

    /// Lists chunk indices the server already holds for `file_id`.
    fn list_chunks(&self, file_id: &str) -> TransportFuture<'_, ChunkListResponse>;

    /// Asks the server to assemble the uploaded chunks.
    fn merge(&self, request: &MergeRequest) -> TransportFuture<'_, MergeResponse>;

    /// Deletes every chunk stored for `file_id`.
    fn cleanup(&self, file_id: &str) -> TransportFuture<'_, CleanupResponse>;
}
