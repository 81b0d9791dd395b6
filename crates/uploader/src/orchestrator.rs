//! Caller-facing upload orchestrator.
//!
//! One [`Uploader`] drives at most one upload session at a time. Starting a
//! new upload supersedes the running one; every state write is tagged with
//! the session's generation so a superseded or cancelled session can no
//! longer touch the published state.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use chunkup_protocol::types::{UploadResult, UploadStatus};
use chunkup_transfer::WindowedHasher;
use chunkup_worker_pool::{HandlerRegistry, PoolStatus, WorkerPool};
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{UploadCallbacks, UploadOptions, UploaderConfig};
use crate::error::UploadError;
use crate::hashing::{HashingService, register_hash_handler};
use crate::http::HttpTransport;
use crate::session::UploadSession;
use crate::transport::UploadTransport;
use crate::types::UploadState;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates an upload id: millisecond timestamp, `_`, 9 random base36
/// characters.
pub fn generate_file_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}_{suffix}", Utc::now().timestamp_millis())
}

/// Uploads files in resumable chunks.
///
/// Cheap to clone; clones share the same session, state and worker pool.
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Uploader {
    shared: Arc<Shared>,
}

impl Uploader {
    /// Creates an uploader over `transport`, spawning the hashing pool.
    pub fn new(
        config: UploaderConfig,
        transport: Arc<dyn UploadTransport>,
        callbacks: UploadCallbacks,
    ) -> Result<Self, UploadError> {
        config.validate()?;

        let mut registry = HandlerRegistry::new();
        register_hash_handler(
            &mut registry,
            WindowedHasher::new(config.hash_algorithm, config.hash_window_size),
        );
        let pool = Arc::new(WorkerPool::new(config.worker_pool_size, registry)?);
        let hashing = HashingService::new(Arc::clone(&pool));

        let (state, _) = watch::channel(UploadState::default());
        let (paused, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                callbacks,
                transport,
                pool,
                hashing,
                state,
                control: Mutex::new(SessionControl {
                    generation_id: 0,
                    cancel: CancellationToken::new(),
                    paused,
                    shut_down: false,
                }),
            }),
        })
    }

    /// Creates an uploader talking HTTP to `config.server_url`.
    pub fn with_http(config: UploaderConfig, callbacks: UploadCallbacks) -> Result<Self, UploadError> {
        let transport = HttpTransport::new(&config.server_url, config.request_timeout())?;
        info!(server = %transport.base_url(), "using HTTP transport");
        Self::new(config, Arc::new(transport), callbacks)
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.shared.config
    }

    /// Uploads the file at `path` under a freshly generated id.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadResult, UploadError> {
        self.upload_file_with(path, UploadOptions::default()).await
    }

    /// Uploads the file at `path`.
    ///
    /// Resolves once the file is merged on the server (or was already
    /// there), or the session fails or is cancelled. The published state
    /// reflects the outcome before this returns.
    pub async fn upload_file_with(
        &self,
        path: impl AsRef<Path>,
        options: UploadOptions,
    ) -> Result<UploadResult, UploadError> {
        let file_id = options.file_id.unwrap_or_else(generate_file_id);
        let session = self.begin_session(path.as_ref(), file_id)?;
        let generation_id = session.generation_id();

        let outcome = session.run().await;
        self.finish_session(generation_id, session.file_id(), &outcome);
        outcome
    }

    /// Stops dispatching new chunks. In-flight chunks still finish.
    ///
    /// Returns `false` unless a session is currently uploading chunks.
    pub fn pause_upload(&self) -> bool {
        let changed = {
            let ctl = self.shared.control();
            if self.shared.state.borrow().status != UploadStatus::Uploading {
                return false;
            }
            ctl.paused.send_replace(true);
            self.shared.apply(|s| {
                s.status = UploadStatus::Paused;
                s.is_paused = true;
            })
        };
        self.shared.notify_status(changed);
        info!("upload paused");
        true
    }

    /// Resumes a paused session. Returns `false` if nothing was paused.
    pub fn resume_upload(&self) -> bool {
        let changed = {
            let ctl = self.shared.control();
            if self.shared.state.borrow().status != UploadStatus::Paused {
                return false;
            }
            ctl.paused.send_replace(false);
            self.shared.apply(|s| {
                s.status = UploadStatus::Uploading;
                s.is_paused = false;
            })
        };
        self.shared.notify_status(changed);
        info!("upload resumed");
        true
    }

    /// Cancels the active session: aborts in-flight requests and any
    /// running hash task. Server-side chunks are left in place.
    pub fn cancel_upload(&self) {
        let changed = {
            let mut ctl = self.shared.control();
            if !self.shared.state.borrow().status.is_active() {
                return;
            }
            ctl.retire_session();
            self.shared.pool.clear();
            self.shared.apply(|s| {
                s.status = UploadStatus::Cancelled;
                s.is_uploading = false;
                s.is_paused = false;
            })
        };
        self.shared.notify_status(changed);
        info!(file_id = ?self.shared.state.borrow().file_id, "upload cancelled");
    }

    /// Cancels any active session and returns to the idle state.
    pub fn reset(&self) {
        let changed = {
            let mut ctl = self.shared.control();
            if self.shared.state.borrow().status.is_active() {
                self.shared.pool.clear();
            }
            ctl.retire_session();
            self.shared.apply(|s| *s = UploadState::default())
        };
        self.shared.notify_status(changed);
    }

    /// Deletes every chunk the server holds for `file_id`.
    pub async fn discard(&self, file_id: &str) -> Result<(), UploadError> {
        self.shared.transport.cleanup(file_id).await?;
        info!(file_id, "server-side upload discarded");
        Ok(())
    }

    pub async fn pool_status(&self) -> PoolStatus {
        self.shared.pool.status().await
    }

    /// Cancels any active session and stops the worker pool. Later uploads
    /// fail with [`UploadError::ShutDown`].
    pub async fn shutdown(&self) {
        self.cancel_upload();
        self.shared.control().shut_down = true;
        self.shared.pool.destroy().await;
    }

    /// Current state snapshot.
    pub fn state(&self) -> UploadState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.shared.state.subscribe()
    }

    fn begin_session(&self, path: &Path, file_id: String) -> Result<UploadSession, UploadError> {
        let (session, changed) = {
            let mut ctl = self.shared.control();
            if ctl.shut_down {
                return Err(UploadError::ShutDown);
            }
            if self.shared.state.borrow().status.is_active() {
                info!("superseding active upload");
                self.shared.pool.clear();
            }
            ctl.retire_session();
            let (paused_tx, paused_rx) = watch::channel(false);
            ctl.paused = paused_tx;

            let changed = self.shared.apply(|s| {
                *s = UploadState {
                    status: UploadStatus::Preparing,
                    is_uploading: true,
                    file_id: Some(file_id.clone()),
                    ..Default::default()
                };
            });
            let session = UploadSession::new(
                Arc::clone(&self.shared),
                ctl.generation_id,
                ctl.cancel.clone(),
                paused_rx,
                path.to_path_buf(),
                file_id,
            );
            (session, changed)
        };
        self.shared.notify_status(changed);
        Ok(session)
    }

    fn finish_session(
        &self,
        generation_id: u64,
        file_id: &str,
        outcome: &Result<UploadResult, UploadError>,
    ) {
        let shared = &self.shared;
        match outcome {
            Ok(result) => {
                let applied = shared.update(generation_id, |s| {
                    s.status = UploadStatus::Completed;
                    s.is_uploading = false;
                    s.is_paused = false;
                    s.error = None;
                });
                if applied {
                    info!(file_id, path = %result.path, "upload completed");
                    if let Some(cb) = &shared.callbacks.on_complete {
                        cb(result);
                    }
                }
            }
            Err(e) if e.is_cancelled() => {
                shared.update(generation_id, |s| {
                    s.status = UploadStatus::Cancelled;
                    s.is_uploading = false;
                    s.is_paused = false;
                });
            }
            Err(e) => {
                let applied = shared.update(generation_id, |s| {
                    s.status = UploadStatus::Error;
                    s.is_uploading = false;
                    s.is_paused = false;
                    s.error = Some(e.to_string());
                });
                if applied {
                    error!(file_id, error = %e, "upload failed");
                    if let Some(cb) = &shared.callbacks.on_error {
                        cb(e);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a session needs from its uploader.
pub(crate) struct Shared {
    pub(crate) config: UploaderConfig,
    pub(crate) callbacks: UploadCallbacks,
    pub(crate) transport: Arc<dyn UploadTransport>,
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) hashing: HashingService,
    state: watch::Sender<UploadState>,
    control: Mutex<SessionControl>,
}

struct SessionControl {
    /// Bumped whenever the current session is superseded, cancelled or
    /// reset. Writes tagged with an older value are dropped.
    generation_id: u64,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    shut_down: bool,
}

impl SessionControl {
    fn retire_session(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation_id += 1;
    }
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, SessionControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` if `generation_id` is still the current session.
    pub(crate) fn update(&self, generation_id: u64, f: impl FnOnce(&mut UploadState)) -> bool {
        let changed = {
            let ctl = self.control();
            if ctl.generation_id != generation_id {
                return false;
            }
            self.apply(f)
        };
        self.notify_status(changed);
        true
    }

    /// Mutates the published state. Returns the new status if it changed.
    /// Callers hold the control lock.
    fn apply(&self, f: impl FnOnce(&mut UploadState)) -> Option<UploadStatus> {
        let mut changed = None;
        self.state.send_modify(|s| {
            let before = s.status;
            f(s);
            if s.status != before {
                changed = Some(s.status);
            }
        });
        changed
    }

    fn notify_status(&self, changed: Option<UploadStatus>) {
        if let Some(status) = changed
            && let Some(cb) = &self.callbacks.on_status_change
        {
            cb(status);
        }
    }
}
