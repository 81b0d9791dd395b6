use std::any::Any;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::handler::{HandlerRegistry, TaskContext};

/// Dispatcher to worker.
pub(crate) enum WorkerMessage {
    Run {
        task_id: String,
        task_type: String,
        payload: Value,
    },
    Shutdown,
}

/// Worker to dispatcher.
#[derive(Debug)]
pub(crate) struct WorkerEvent {
    pub worker: usize,
    pub task_id: String,
    pub kind: EventKind,
}

#[derive(Debug)]
pub(crate) enum EventKind {
    Progress(f64),
    Completed(Value),
    Failed(String),
}

/// Body of a worker thread: runs one task at a time until told to stop.
///
/// A panicking handler fails only its own task; the thread keeps serving.
pub(crate) fn worker_loop(
    worker: usize,
    registry: Arc<HandlerRegistry>,
    inbox: Receiver<WorkerMessage>,
    control: Receiver<String>,
    events: UnboundedSender<WorkerEvent>,
) {
    debug!(worker, "worker started");

    while let Ok(WorkerMessage::Run {
        task_id,
        task_type,
        payload,
    }) = inbox.recv()
    {
        let outcome = match registry.get(&task_type) {
            Some(handler) => {
                let ctx = TaskContext {
                    task_id: &task_id,
                    worker,
                    events: &events,
                    control: &control,
                    cancelled: Cell::new(false),
                };
                catch_unwind(AssertUnwindSafe(|| handler.run(payload, &ctx))).unwrap_or_else(
                    |panic| {
                        let msg = panic_message(panic.as_ref());
                        warn!(worker, task_id = %task_id, "task handler panicked: {msg}");
                        Err(format!("handler panicked: {msg}"))
                    },
                )
            }
            None => Err(format!("no handler registered for task type: {task_type}")),
        };

        let kind = match outcome {
            Ok(value) => EventKind::Completed(value),
            Err(e) => EventKind::Failed(e),
        };
        if events
            .send(WorkerEvent {
                worker,
                task_id,
                kind,
            })
            .is_err()
        {
            break;
        }
    }

    debug!(worker, "worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
