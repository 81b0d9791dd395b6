use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::error::PoolError;
use crate::handler::HandlerRegistry;
use crate::worker::{EventKind, WorkerEvent, WorkerMessage, worker_loop};

/// Callback receiving progress values a handler reports.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub running_tasks: usize,
}

/// Resolves once with the task's result.
///
/// Dropping the handle does not cancel the task.
pub struct TaskHandle {
    task_id: String,
    rx: oneshot::Receiver<Result<Value, PoolError>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Future for TaskHandle {
    type Output = Result<Value, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(PoolError::Destroyed)))
    }
}

/// Handle to a running pool. Cheap to share behind an `Arc`.
///
/// Dropping the last handle shuts the workers down the same way
/// [`destroy`](Self::destroy) does, without waiting for them.
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<Command>,
    max_workers: usize,
}

impl WorkerPool {
    /// Spawns `max_workers` threads (at least one) and the dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(max_workers: usize, registry: HandlerRegistry) -> Result<Self, PoolError> {
        let max_workers = max_workers.max(1);
        let registry = Arc::new(registry);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(max_workers);
        for index in 0..max_workers {
            let (inbox_tx, inbox_rx) = std_mpsc::channel();
            let (control_tx, control_rx) = std_mpsc::channel();
            let registry = Arc::clone(&registry);
            let events = events_tx.clone();

            let thread = std::thread::Builder::new()
                .name(format!("pool-worker-{index}"))
                .spawn(move || worker_loop(index, registry, inbox_rx, control_rx, events))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;

            workers.push(WorkerSlot {
                inbox: inbox_tx,
                control: control_tx,
                current_task: None,
                thread: Some(thread),
            });
        }
        drop(events_tx);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            registry,
            workers,
            queue: VecDeque::new(),
            running: HashMap::new(),
            commands: commands_rx,
            events: events_rx,
        };
        tokio::spawn(dispatcher.run());

        info!(max_workers, "worker pool started");
        Ok(Self {
            commands: commands_tx,
            max_workers,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Queues a task and returns a handle resolving to its result.
    ///
    /// Never blocks. The task runs as soon as a worker is idle, in
    /// submission order.
    pub fn execute(
        &self,
        task_type: &str,
        payload: Value,
        on_progress: Option<ProgressCallback>,
    ) -> TaskHandle {
        let task_id = uuid::Uuid::new_v4().to_string();
        let (reply, rx) = oneshot::channel();
        let task = QueuedTask {
            id: task_id.clone(),
            task_type: task_type.to_string(),
            payload,
            on_progress,
            reply,
        };
        // On failure the reply sender is dropped with the command and the
        // handle resolves to `Destroyed`.
        let _ = self.commands.send(Command::Execute(task));
        TaskHandle { task_id, rx }
    }

    /// Cancels every queued and running task. Does not wait for workers to
    /// acknowledge.
    pub fn clear(&self) {
        let _ = self.commands.send(Command::Clear);
    }

    pub async fn status(&self) -> PoolStatus {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Status(tx)).is_err() {
            return PoolStatus::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Clears the pool, stops every worker and waits for their threads.
    ///
    /// Later `execute` calls resolve to [`PoolError::Destroyed`].
    pub async fn destroy(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Destroy(tx)).is_err() {
            return;
        }
        let Ok(threads) = rx.await else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || {
            for thread in threads {
                let _ = thread.join();
            }
        })
        .await;
        info!("worker pool destroyed");
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

enum Command {
    Execute(QueuedTask),
    Clear,
    Status(oneshot::Sender<PoolStatus>),
    Destroy(oneshot::Sender<Vec<JoinHandle<()>>>),
}

struct QueuedTask {
    id: String,
    task_type: String,
    payload: Value,
    on_progress: Option<ProgressCallback>,
    reply: oneshot::Sender<Result<Value, PoolError>>,
}

struct RunningTask {
    on_progress: Option<ProgressCallback>,
    reply: oneshot::Sender<Result<Value, PoolError>>,
}

struct WorkerSlot {
    inbox: std_mpsc::Sender<WorkerMessage>,
    control: std_mpsc::Sender<String>,
    /// A worker is busy exactly when this is set.
    current_task: Option<String>,
    thread: Option<JoinHandle<()>>,
}

/// Owns the queue and worker table. Runs as a single tokio task.
struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    workers: Vec<WorkerSlot>,
    queue: VecDeque<QueuedTask>,
    running: HashMap<String, RunningTask>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Execute(task)) => self.enqueue(task),
                    Some(Command::Clear) => self.clear(),
                    Some(Command::Status(tx)) => {
                        let _ = tx.send(self.status());
                    }
                    Some(Command::Destroy(tx)) => {
                        let threads = self.shutdown();
                        let _ = tx.send(threads);
                        return;
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }
        }
    }

    fn enqueue(&mut self, task: QueuedTask) {
        if !self.registry.contains(&task.task_type) {
            let _ = task
                .reply
                .send(Err(PoolError::UnknownTaskType(task.task_type)));
            return;
        }
        debug!(task_id = %task.id, task_type = %task.task_type, "task queued");
        self.queue.push_back(task);
        self.dispatch();
    }

    /// Hands queued tasks to idle workers, oldest first.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(worker) = self.workers.iter().position(|w| w.current_task.is_none()) else {
                return;
            };
            let Some(task) = self.queue.pop_front() else {
                return;
            };

            let slot = &mut self.workers[worker];
            let sent = slot.inbox.send(WorkerMessage::Run {
                task_id: task.id.clone(),
                task_type: task.task_type,
                payload: task.payload,
            });
            if sent.is_err() {
                let _ = task
                    .reply
                    .send(Err(PoolError::TaskFailed(format!("worker {worker} unavailable"))));
                continue;
            }

            debug!(task_id = %task.id, worker, "task assigned");
            slot.current_task = Some(task.id.clone());
            self.running.insert(
                task.id,
                RunningTask {
                    on_progress: task.on_progress,
                    reply: task.reply,
                },
            );
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        let result = match event.kind {
            EventKind::Progress(value) => {
                if let Some(task) = self.running.get(&event.task_id)
                    && let Some(cb) = &task.on_progress
                {
                    cb(value);
                }
                return;
            }
            EventKind::Completed(value) => Ok(value),
            EventKind::Failed(e) => Err(PoolError::TaskFailed(e)),
        };

        // Tasks rejected by `clear` are no longer tracked; their late
        // results are dropped.
        if let Some(task) = self.running.remove(&event.task_id) {
            debug!(task_id = %event.task_id, ok = result.is_ok(), "task finished");
            let _ = task.reply.send(result);
        }

        // Only release the worker if it is still on this task. After a clear
        // it may already hold a newer assignment.
        if let Some(slot) = self.workers.get_mut(event.worker)
            && slot.current_task.as_deref() == Some(event.task_id.as_str())
        {
            slot.current_task = None;
        }

        self.dispatch();
    }

    fn clear(&mut self) {
        let queued = self.queue.len();
        for task in self.queue.drain(..) {
            let _ = task.reply.send(Err(PoolError::Cancelled));
        }

        let mut cancelled = 0;
        for slot in self.workers.iter_mut() {
            let Some(task_id) = slot.current_task.take() else {
                continue;
            };
            let _ = slot.control.send(task_id.clone());
            if let Some(task) = self.running.remove(&task_id) {
                let _ = task.reply.send(Err(PoolError::Cancelled));
            }
            cancelled += 1;
        }

        if queued > 0 || cancelled > 0 {
            info!(queued, running = cancelled, "worker pool cleared");
        }
    }

    fn status(&self) -> PoolStatus {
        let busy_workers = self
            .workers
            .iter()
            .filter(|w| w.current_task.is_some())
            .count();
        PoolStatus {
            total_workers: self.workers.len(),
            busy_workers,
            idle_workers: self.workers.len() - busy_workers,
            queued_tasks: self.queue.len(),
            running_tasks: self.running.len(),
        }
    }

    /// Clears, then tells every worker to stop. Returns their join handles.
    fn shutdown(&mut self) -> Vec<JoinHandle<()>> {
        self.clear();
        let mut threads = Vec::with_capacity(self.workers.len());
        for slot in self.workers.drain(..) {
            let _ = slot.inbox.send(WorkerMessage::Shutdown);
            if let Some(thread) = slot.thread {
                threads.push(thread);
            }
        }
        threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn echo_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |payload, _ctx| Ok(payload));
        registry
    }

    /// Registers a "block" handler that spins until `release` is set or the
    /// task is cancelled.
    fn blocking_registry(release: Arc<AtomicBool>, saw_cancel: Arc<AtomicBool>) -> HandlerRegistry {
        let mut registry = echo_registry();
        registry.register_fn("block", move |payload, ctx| {
            loop {
                if ctx.is_cancelled() {
                    saw_cancel.store(true, Ordering::SeqCst);
                    return Err("cancelled".into());
                }
                if release.load(Ordering::SeqCst) {
                    return Ok(payload);
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        registry
    }

    async fn wait_for(flag: &AtomicBool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("flag never set");
    }

    #[tokio::test]
    async fn execute_returns_handler_result() {
        let pool = WorkerPool::new(2, echo_registry()).unwrap();
        let result = pool.execute("echo", json!({"n": 1}), None).await.unwrap();
        assert_eq!(result, json!({"n": 1}));
    }

    #[tokio::test]
    async fn single_worker_runs_tasks_in_fifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        let seen = Arc::clone(&order);
        registry.register_fn("record", move |payload, _ctx| {
            seen.lock().unwrap().push(payload.as_i64().unwrap_or(-1));
            Ok(Value::Null)
        });
        let pool = WorkerPool::new(1, registry).unwrap();

        let handles: Vec<_> = (0..5)
            .map(|i| pool.execute("record", json!(i), None))
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn never_exceeds_max_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        registry.register_fn("work", move |_, _ctx| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let pool = WorkerPool::new(2, registry).unwrap();

        let handles: Vec<_> = (0..8).map(|_| pool.execute("work", Value::Null, None)).collect();
        for h in handles {
            assert!(h.await.is_ok());
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn handler_error_fails_only_that_task() {
        let mut registry = echo_registry();
        registry.register_fn("fail", |_, _ctx| Err("boom".into()));
        let pool = WorkerPool::new(1, registry).unwrap();

        let err = pool.execute("fail", Value::Null, None).await.unwrap_err();
        assert_eq!(err, PoolError::TaskFailed("boom".into()));

        let ok = pool.execute("echo", json!("still alive"), None).await.unwrap();
        assert_eq!(ok, json!("still alive"));
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_worker() {
        let mut registry = echo_registry();
        registry.register_fn("panic", |_, _ctx| panic!("kaboom"));
        let pool = WorkerPool::new(1, registry).unwrap();

        match pool.execute("panic", Value::Null, None).await {
            Err(PoolError::TaskFailed(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("unexpected result: {other:?}"),
        }

        let ok = pool.execute("echo", json!(7), None).await.unwrap();
        assert_eq!(ok, json!(7));
        assert_eq!(pool.status().await.idle_workers, 1);
    }

    #[tokio::test]
    async fn unknown_task_type_is_rejected() {
        let pool = WorkerPool::new(1, echo_registry()).unwrap();
        let err = pool.execute("nope", Value::Null, None).await.unwrap_err();
        assert_eq!(err, PoolError::UnknownTaskType("nope".into()));
    }

    #[tokio::test]
    async fn progress_is_relayed_before_result() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("steps", |_, ctx| {
            for p in [25.0, 50.0, 100.0] {
                ctx.report_progress(p);
            }
            Ok(json!("done"))
        });
        let pool = WorkerPool::new(1, registry).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |p: f64| sink.lock().unwrap().push(p));

        let result = pool.execute("steps", Value::Null, Some(cb)).await.unwrap();
        assert_eq!(result, json!("done"));
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0, 100.0]);
    }

    #[tokio::test]
    async fn status_reports_busy_and_queued() {
        let release = Arc::new(AtomicBool::new(false));
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let pool =
            WorkerPool::new(1, blocking_registry(Arc::clone(&release), saw_cancel)).unwrap();

        let first = pool.execute("block", json!(1), None);
        let second = pool.execute("echo", json!(2), None);
        let third = pool.execute("echo", json!(3), None);

        let status = pool.status().await;
        assert_eq!(
            status,
            PoolStatus {
                total_workers: 1,
                busy_workers: 1,
                idle_workers: 0,
                queued_tasks: 2,
                running_tasks: 1,
            }
        );

        release.store(true, Ordering::SeqCst);
        assert_eq!(first.await.unwrap(), json!(1));
        assert_eq!(second.await.unwrap(), json!(2));
        assert_eq!(third.await.unwrap(), json!(3));

        let status = pool.status().await;
        assert_eq!(status.busy_workers, 0);
        assert_eq!(status.queued_tasks, 0);
        assert_eq!(status.running_tasks, 0);
    }

    #[tokio::test]
    async fn clear_cancels_queued_and_running_tasks() {
        let release = Arc::new(AtomicBool::new(false));
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let pool = WorkerPool::new(
            1,
            blocking_registry(Arc::clone(&release), Arc::clone(&saw_cancel)),
        )
        .unwrap();

        let running = pool.execute("block", Value::Null, None);
        let queued = pool.execute("echo", Value::Null, None);
        pool.clear();

        assert_eq!(running.await.unwrap_err(), PoolError::Cancelled);
        assert_eq!(queued.await.unwrap_err(), PoolError::Cancelled);

        let status = pool.status().await;
        assert_eq!(status.busy_workers, 0);
        assert_eq!(status.queued_tasks, 0);

        // The handler observes the cancel signal cooperatively.
        wait_for(&saw_cancel).await;

        // The pool keeps working afterwards.
        let ok = pool.execute("echo", json!("after"), None).await.unwrap();
        assert_eq!(ok, json!("after"));
    }

    #[tokio::test]
    async fn destroy_rejects_later_tasks() {
        let pool = WorkerPool::new(2, echo_registry()).unwrap();
        assert_eq!(pool.execute("echo", json!(1), None).await.unwrap(), json!(1));

        pool.destroy().await;

        let err = pool.execute("echo", json!(2), None).await.unwrap_err();
        assert_eq!(err, PoolError::Destroyed);
        assert_eq!(pool.status().await, PoolStatus::default());
    }

    #[tokio::test]
    async fn destroy_cancels_running_task() {
        let release = Arc::new(AtomicBool::new(false));
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let pool = WorkerPool::new(
            1,
            blocking_registry(Arc::clone(&release), Arc::clone(&saw_cancel)),
        )
        .unwrap();

        let running = pool.execute("block", Value::Null, None);
        pool.destroy().await;

        assert_eq!(running.await.unwrap_err(), PoolError::Cancelled);
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_workers_is_clamped_to_one() {
        let pool = WorkerPool::new(0, echo_registry()).unwrap();
        assert_eq!(pool.max_workers(), 1);
        assert_eq!(pool.status().await.total_workers, 1);
    }
}
