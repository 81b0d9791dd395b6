//! One upload session: hash, check, plan, transfer chunks, merge.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chunkup_protocol::messages::MergeRequest;
use chunkup_protocol::types::{UploadPhase, UploadProgress, UploadResult, UploadStatus};
use chunkup_transfer::{ChunkDescriptor, ProgressTracker, plan_chunks, read_chunk, upload_filename};
use chunkup_worker_pool::ProgressCallback;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::orchestrator::Shared;
use crate::transport::ChunkProgress;
use crate::types::UploadState;

/// Drives a single file through the upload pipeline.
///
/// Every state write goes through the generation check in [`Shared`], so a
/// session that has been superseded keeps running harmlessly until its
/// cancellation token stops it.
pub(crate) struct UploadSession {
    shared: Arc<Shared>,
    generation_id: u64,
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
    path: PathBuf,
    file_id: String,
}

impl UploadSession {
    pub(crate) fn new(
        shared: Arc<Shared>,
        generation_id: u64,
        cancel: CancellationToken,
        paused: watch::Receiver<bool>,
        path: PathBuf,
        file_id: String,
    ) -> Self {
        Self {
            shared,
            generation_id,
            cancel,
            paused,
            path,
            file_id,
        }
    }

    pub(crate) fn generation_id(&self) -> u64 {
        self.generation_id
    }

    pub(crate) fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Runs the pipeline:
    /// 1. Hash the whole file on the worker pool
    /// 2. Ask the server whether it already has it (instant upload)
    /// 3. Plan chunks and seed from the server's chunk list (resume)
    /// 4. Upload missing chunks with bounded concurrency and retries
    /// 5. Merge
    pub(crate) async fn run(&self) -> Result<UploadResult, UploadError> {
        let file_id = self.file_id.as_str();
        let filename = upload_filename(&self.path)?;
        info!(file_id, file = %self.path.display(), "upload started");

        // 1. Hash
        self.set_status(UploadStatus::CalculatingHash);
        let pool = self.shared.pool.status().await;
        debug!(
            busy = pool.busy_workers,
            idle = pool.idle_workers,
            queued = pool.queued_tasks,
            "worker pool before hashing"
        );
        let hash = self
            .until_cancelled(
                self.shared
                    .hashing
                    .calculate_hash(&self.path, Some(self.hash_progress_callback())),
            )
            .await??;
        debug!(file_id, hash = %hash, "file hashed");

        // 2. Existence check
        self.set_status(UploadStatus::Checking);
        let check = self
            .until_cancelled(self.shared.transport.check_exists(&hash, &filename))
            .await?
            .map_err(UploadError::Check)?;
        if check.exists {
            info!(file_id, hash = %hash, "file already on server, skipping transfer");
            return Ok(UploadResult {
                success: true,
                file_id: file_id.to_string(),
                filename,
                path: check.path.unwrap_or_default(),
                size: 0,
                hash: check.hash.unwrap_or(hash),
            });
        }

        // 3. Plan and resume
        self.set_status(UploadStatus::Preparing);
        let total_size = tokio::fs::metadata(&self.path).await?.len();
        let chunks = plan_chunks(total_size, self.shared.config.chunk_size)?;
        let total_chunks = chunks.len();

        let listed = self
            .until_cancelled(self.shared.transport.list_chunks(file_id))
            .await?
            .map_err(UploadError::ChunkList)?;
        let present: BTreeSet<usize> = listed
            .chunks
            .into_iter()
            .filter(|&index| index < total_chunks)
            .collect();

        let mut tracker = ProgressTracker::new(total_size, total_chunks);
        let seeded_bytes = chunks
            .iter()
            .filter(|c| present.contains(&c.index))
            .map(|c| c.size)
            .sum();
        tracker.seed(present.len(), seeded_bytes);
        if !present.is_empty() {
            info!(file_id, present = present.len(), total_chunks, "resuming upload");
        }

        let snapshot = tracker.snapshot(UploadPhase::Uploading);
        if self.update(|s| {
            s.uploaded_chunks = present.clone();
            s.progress = snapshot.clone();
        }) {
            self.emit_progress(&snapshot);
        }

        // 4. Transfer
        let pending: VecDeque<ChunkDescriptor> = chunks
            .into_iter()
            .filter(|c| !present.contains(&c.index))
            .collect();
        self.set_status(UploadStatus::Uploading);
        self.upload_chunks(pending, &mut tracker).await?;
        debug_assert!(tracker.is_complete());
        debug!(file_id, bytes = tracker.uploaded_bytes(), total_chunks, "all chunks on server");

        // 5. Merge
        let snapshot = tracker.snapshot(UploadPhase::Merging);
        self.update(|s| {
            s.status = UploadStatus::Merging;
            s.is_paused = false;
            s.progress = snapshot;
        });
        let request = MergeRequest {
            file_id: file_id.to_string(),
            total_chunks,
            filename: filename.clone(),
        };
        let merged = self
            .until_cancelled(self.shared.transport.merge(&request))
            .await?
            .map_err(UploadError::Merge)?;
        info!(file_id, path = %merged.path, size = merged.size, "chunks merged");

        Ok(UploadResult {
            success: true,
            file_id: file_id.to_string(),
            filename: if merged.filename.is_empty() {
                filename
            } else {
                merged.filename
            },
            path: merged.path,
            size: merged.size,
            hash: if merged.hash.is_empty() {
                hash
            } else {
                merged.hash
            },
        })
    }

    /// Keeps up to `concurrent_limit` chunks in flight until the queue is
    /// drained. While paused no new chunk starts; in-flight ones finish.
    async fn upload_chunks(
        &self,
        mut queue: VecDeque<ChunkDescriptor>,
        tracker: &mut ProgressTracker,
    ) -> Result<(), UploadError> {
        let limit = self.shared.config.concurrent_limit.max(1);
        let mut paused = self.paused.clone();
        let mut in_flight = FuturesUnordered::new();

        loop {
            if !*paused.borrow_and_update() {
                while in_flight.len() < limit {
                    let Some(chunk) = queue.pop_front() else {
                        break;
                    };
                    in_flight.push(self.transfer_chunk(chunk));
                }
            }
            if in_flight.is_empty() && queue.is_empty() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                changed = paused.changed() => {
                    // Sender gone: the session was replaced.
                    if changed.is_err() {
                        return Err(UploadError::Cancelled);
                    }
                }
                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                    let chunk = done?;
                    let progress = tracker.record_chunk(chunk.size);
                    debug!(
                        index = chunk.index,
                        done = progress.uploaded_chunks,
                        total = progress.total_chunks,
                        "chunk uploaded"
                    );
                    if self.update(|s| {
                        s.uploaded_chunks.insert(chunk.index);
                        s.progress = progress.clone();
                    }) {
                        self.emit_progress(&progress);
                    }
                }
            }
        }
    }

    /// Reads and sends one chunk, retrying transient failures with
    /// exponential backoff.
    async fn transfer_chunk(&self, mut chunk: ChunkDescriptor) -> Result<ChunkDescriptor, UploadError> {
        let max_attempts = self.shared.config.max_retries.saturating_add(1);

        loop {
            self.check_cancelled()?;
            let data = read_chunk(&self.path, &chunk).await?;

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                r = self.shared.transport.upload_chunk(
                    &self.file_id,
                    chunk.index,
                    data,
                    self.chunk_progress_callback(chunk.index),
                ) => r,
            };

            let err = match sent {
                Ok(_) => return Ok(chunk),
                Err(e) => e,
            };
            chunk.retries += 1;
            if !err.is_retryable() || chunk.retries >= max_attempts {
                return Err(UploadError::Chunk {
                    index: chunk.index,
                    attempts: chunk.retries,
                    source: err,
                });
            }

            let delay = self.shared.config.retry_delay(chunk.retries - 1);
            warn!(
                index = chunk.index,
                attempt = chunk.retries,
                ?delay,
                error = %err,
                "chunk upload failed, retrying"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, UploadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            out = fut => Ok(out),
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut UploadState)) -> bool {
        self.shared.update(self.generation_id, f)
    }

    fn set_status(&self, status: UploadStatus) {
        let phase = match status {
            UploadStatus::CalculatingHash => Some(UploadPhase::CalculatingHash),
            UploadStatus::Preparing | UploadStatus::Checking => Some(UploadPhase::Preparing),
            UploadStatus::Uploading => Some(UploadPhase::Uploading),
            UploadStatus::Merging => Some(UploadPhase::Merging),
            _ => None,
        };
        self.update(|s| {
            s.status = status;
            if let Some(phase) = phase {
                s.progress.phase = phase;
            }
        });
    }

    fn emit_progress(&self, progress: &UploadProgress) {
        if let Some(cb) = &self.shared.callbacks.on_progress {
            cb(progress);
        }
    }

    fn hash_progress_callback(&self) -> ProgressCallback {
        let shared = Arc::clone(&self.shared);
        let generation_id = self.generation_id;
        Arc::new(move |pct: f64| {
            if shared.update(generation_id, |s| s.hash_progress = pct)
                && let Some(cb) = &shared.callbacks.on_hash_progress
            {
                cb(pct);
            }
        })
    }

    fn chunk_progress_callback(&self, index: usize) -> Option<ChunkProgress> {
        let cb = self.shared.callbacks.on_chunk_progress.clone()?;
        Some(Arc::new(move |pct: f64| cb(index, pct)))
    }
}
