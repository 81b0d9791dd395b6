//! Uploader configuration and caller callbacks.

use std::sync::Arc;
use std::time::Duration;

use chunkup_protocol::types::{UploadProgress, UploadResult, UploadStatus};
use chunkup_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_HASH_WINDOW, HashAlgorithm};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Tunables for an [`Uploader`](crate::Uploader).
///
/// Every field has a default, so a partial TOML/JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Bytes per uploaded chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks in flight at once.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// Extra attempts per chunk after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Background threads used for hashing.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Backoff before retry `i` is `retry_base_delay_ms * 2^i`.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Read window used while hashing.
    #[serde(default = "default_hash_window_size")]
    pub hash_window_size: usize,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Base URL of the upload server; routes are appended under `/upload`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_concurrent_limit() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_worker_pool_size() -> usize {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_hash_window_size() -> usize {
    DEFAULT_HASH_WINDOW
}

fn default_request_timeout_secs() -> u64 {
    chunkup_protocol::constants::REQUEST_TIMEOUT.as_secs()
}

fn default_server_url() -> String {
    "http://localhost:3000/api".into()
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrent_limit: default_concurrent_limit(),
            max_retries: default_max_retries(),
            worker_pool_size: default_worker_pool_size(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            hash_window_size: default_hash_window_size(),
            hash_algorithm: HashAlgorithm::default(),
            request_timeout_secs: default_request_timeout_secs(),
            server_url: default_server_url(),
        }
    }
}

impl UploaderConfig {
    /// Rejects values the upload flow cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::Config("chunk_size must be greater than zero".into()));
        }
        if self.concurrent_limit == 0 {
            return Err(UploadError::Config(
                "concurrent_limit must be greater than zero".into(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(UploadError::Config(
                "worker_pool_size must be greater than zero".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(UploadError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff before the attempt following failed attempt `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_base_delay().saturating_mul(factor)
    }
}

/// Optional per-upload settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Reuse an existing upload id to resume a previous session. A fresh id
    /// is generated when `None`.
    pub file_id: Option<String>,
}

pub type ProgressFn = Arc<dyn Fn(&UploadProgress) + Send + Sync>;
pub type HashProgressFn = Arc<dyn Fn(f64) + Send + Sync>;
pub type ChunkProgressFn = Arc<dyn Fn(usize, f64) + Send + Sync>;
pub type CompleteFn = Arc<dyn Fn(&UploadResult) + Send + Sync>;
pub type ErrorFn = Arc<dyn Fn(&UploadError) + Send + Sync>;
pub type StatusFn = Arc<dyn Fn(UploadStatus) + Send + Sync>;

/// Caller hooks fired as an upload advances.
///
/// Callbacks run inline on the uploader's tasks and must return quickly.
#[derive(Clone, Default)]
pub struct UploadCallbacks {
    pub on_progress: Option<ProgressFn>,
    pub on_hash_progress: Option<HashProgressFn>,
    /// Chunk index and percentage of that chunk's body sent.
    pub on_chunk_progress: Option<ChunkProgressFn>,
    pub on_complete: Option<CompleteFn>,
    pub on_error: Option<ErrorFn>,
    pub on_status_change: Option<StatusFn>,
}

impl std::fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_hash_progress", &self.on_hash_progress.is_some())
            .field("on_chunk_progress", &self.on_chunk_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = UploaderConfig::default();
        assert_eq!(config.chunk_size, 10 * 1024 * 1024);
        assert_eq!(config.concurrent_limit, 3);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.worker_pool_size, 2);
        assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.hash_algorithm, HashAlgorithm::Md5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_uses_defaults() {
        let config: UploaderConfig =
            serde_json::from_str(r#"{"chunk_size": 1024, "hash_algorithm": "sha256"}"#).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.concurrent_limit, 3);
        assert_eq!(config.server_url, "http://localhost:3000/api");
    }

    #[test]
    fn validate_rejects_zero_values() {
        let bad = [
            UploaderConfig {
                chunk_size: 0,
                ..Default::default()
            },
            UploaderConfig {
                concurrent_limit: 0,
                ..Default::default()
            },
            UploaderConfig {
                worker_pool_size: 0,
                ..Default::default()
            },
            UploaderConfig {
                request_timeout_secs: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(UploadError::Config(_))));
        }
    }

    #[test]
    fn retry_delay_doubles() {
        let config = UploaderConfig {
            retry_base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(200));
        assert_eq!(config.retry_delay(2), Duration::from_millis(400));
        // Large attempt numbers saturate instead of overflowing.
        assert!(config.retry_delay(64) >= config.retry_delay(31));
    }
}
