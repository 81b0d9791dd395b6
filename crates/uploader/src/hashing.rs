//! Whole-file hashing on the worker pool.

use std::path::Path;
use std::sync::Arc;

use chunkup_transfer::WindowedHasher;
use chunkup_worker_pool::{HandlerRegistry, ProgressCallback, TaskContext, TaskHandler, WorkerPool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::HashError;

/// Task type the hash handler is registered under.
pub const HASH_TASK: &str = "calculate-hash";

#[derive(Debug, Serialize, Deserialize)]
struct HashRequest {
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HashReply {
    hash: String,
}

/// Pool handler: streams the file through the digest, reporting progress
/// per window and stopping between windows when cancelled.
struct HashHandler {
    hasher: WindowedHasher,
}

impl TaskHandler for HashHandler {
    fn run(&self, payload: Value, ctx: &TaskContext<'_>) -> Result<Value, String> {
        let req: HashRequest =
            serde_json::from_value(payload).map_err(|e| format!("invalid hash request: {e}"))?;

        let hash = self
            .hasher
            .hash_file(
                Path::new(&req.path),
                |pct| ctx.report_progress(pct),
                || ctx.is_cancelled(),
            )
            .map_err(|e| format!("failed to read file: {e}"))?;

        serde_json::to_value(HashReply { hash }).map_err(|e| e.to_string())
    }
}

/// Registers the [`HASH_TASK`] handler.
pub fn register_hash_handler(registry: &mut HandlerRegistry, hasher: WindowedHasher) {
    debug!(
        algorithm = ?hasher.algorithm(),
        window = hasher.window_size(),
        "hash handler registered"
    );
    registry.register(HASH_TASK, HashHandler { hasher });
}

/// Computes file digests off the async runtime, on the shared worker pool.
#[derive(Clone)]
pub struct HashingService {
    pool: Arc<WorkerPool>,
}

impl HashingService {
    /// `pool` must have been built with [`register_hash_handler`].
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Hashes the file at `path` and returns the lowercase hex digest.
    ///
    /// `on_progress` receives non-decreasing percentages ending at 100
    /// before this resolves.
    pub async fn calculate_hash(
        &self,
        path: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<String, HashError> {
        let path = path
            .to_str()
            .ok_or_else(|| HashError::Failed(format!("path is not valid UTF-8: {}", path.display())))?;
        let payload = serde_json::to_value(HashRequest {
            path: path.to_string(),
        })
        .map_err(|e| HashError::Failed(e.to_string()))?;

        let handle = self.pool.execute(HASH_TASK, payload, on_progress);
        debug!(task_id = handle.task_id(), path, "hash task submitted");

        let value = handle.await?;
        let reply: HashReply = serde_json::from_value(value)
            .map_err(|e| HashError::Failed(format!("malformed hash result: {e}")))?;
        Ok(reply.hash)
    }
}
