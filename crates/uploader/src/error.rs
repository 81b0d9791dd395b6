//! Upload error types.

use chunkup_transfer::TransferError;
use chunkup_worker_pool::PoolError;

/// Errors from a single request against the upload server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// 2xx reply whose body carried `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether a chunk upload failing with this error may be attempted again.
    ///
    /// Connection failures, timeouts, 5xx, 408 and 429 are transient.
    /// Validation failures and other 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(e) => !(e.is_builder() || e.is_decode() || e.is_redirect()),
            TransportError::Timeout => true,
            TransportError::Server { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransportError::Rejected(_) => true,
            TransportError::Decode(_) | TransportError::InvalidRequest(_) => false,
        }
    }
}

/// Errors from hashing a file on the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("{0}")]
    Failed(String),

    #[error("hashing cancelled")]
    Cancelled,

    #[error("worker pool unavailable")]
    PoolUnavailable,
}

impl From<PoolError> for HashError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Cancelled => HashError::Cancelled,
            PoolError::Destroyed => HashError::PoolUnavailable,
            PoolError::TaskFailed(msg) => HashError::Failed(msg),
            other => HashError::Failed(other.to_string()),
        }
    }
}

/// Errors produced by an upload session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload cancelled")]
    Cancelled,

    #[error("hash calculation failed: {0}")]
    Hash(#[from] HashError),

    #[error("existence check failed: {0}")]
    Check(#[source] TransportError),

    #[error("failed to list uploaded chunks: {0}")]
    ChunkList(#[source] TransportError),

    #[error("chunk {index} failed after {attempts} attempt(s): {source}")]
    Chunk {
        index: usize,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("merge failed: {0}")]
    Merge(#[source] TransportError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("uploader has been shut down")]
    ShutDown,
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            UploadError::Cancelled | UploadError::Hash(HashError::Cancelled)
        )
    }
}
