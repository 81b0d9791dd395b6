/// Errors surfaced by [`WorkerPool`](crate::WorkerPool) task handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The task was queued or running when the pool was cleared.
    #[error("task cancelled")]
    Cancelled,

    /// The pool has been destroyed; no task can run on it.
    #[error("worker pool destroyed")]
    Destroyed,

    /// The handler returned an error or panicked.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("no handler registered for task type: {0}")]
    UnknownTaskType(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
