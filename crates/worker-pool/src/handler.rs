use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::worker::{EventKind, WorkerEvent};

/// Work executed on a pool thread for one task type.
///
/// Handlers run synchronously on a dedicated OS thread, so blocking I/O is
/// fine. Long handlers should poll [`TaskContext::is_cancelled`].
pub trait TaskHandler: Send + Sync + 'static {
    fn run(&self, payload: Value, ctx: &TaskContext<'_>) -> Result<Value, String>;
}

struct FnHandler<F>(F);

impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(Value, &TaskContext<'_>) -> Result<Value, String> + Send + Sync + 'static,
{
    fn run(&self, payload: Value, ctx: &TaskContext<'_>) -> Result<Value, String> {
        (self.0)(payload, ctx)
    }
}

/// Task type name to handler map, shared by every worker.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `task_type`, replacing any previous one.
    pub fn register(&mut self, task_type: impl Into<String>, handler: impl TaskHandler) {
        self.handlers.insert(task_type.into(), Arc::new(handler));
    }

    /// Registers a closure as the handler for `task_type`.
    pub fn register_fn<F>(&mut self, task_type: impl Into<String>, f: F)
    where
        F: Fn(Value, &TaskContext<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(task_type, FnHandler(f));
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }
}

/// Per-task view a handler gets of its worker.
pub struct TaskContext<'a> {
    pub(crate) task_id: &'a str,
    pub(crate) worker: usize,
    pub(crate) events: &'a UnboundedSender<WorkerEvent>,
    pub(crate) control: &'a Receiver<String>,
    pub(crate) cancelled: Cell<bool>,
}

impl TaskContext<'_> {
    pub fn task_id(&self) -> &str {
        self.task_id
    }

    /// Relays a progress value to the caller's progress callback.
    pub fn report_progress(&self, value: f64) {
        let _ = self.events.send(WorkerEvent {
            worker: self.worker,
            task_id: self.task_id.to_string(),
            kind: EventKind::Progress(value),
        });
    }

    /// Returns `true` once the pool asked this task to stop.
    ///
    /// Cancel signals addressed to earlier tasks are discarded.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.get() {
            return true;
        }
        while let Ok(id) = self.control.try_recv() {
            if id == self.task_id {
                self.cancelled.set(true);
            }
        }
        self.cancelled.get()
    }
}
