//! A fixed-size pool of long-lived worker threads.
//!
//! Tasks are tagged with a type name and carry a JSON payload. A single
//! dispatcher task owns the FIFO queue and the worker table; workers only
//! talk to it through channels, so no lock guards pool state.
//!
//! ```ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("double", |payload, _ctx| {
//!     Ok(json!(payload.as_i64().unwrap_or(0) * 2))
//! });
//! let pool = WorkerPool::new(2, registry)?;
//! let result = pool.execute("double", json!(21), None).await?;
//! ```

mod error;
mod handler;
mod pool;
mod worker;

pub use error::PoolError;
pub use handler::{HandlerRegistry, TaskContext, TaskHandler};
pub use pool::{PoolStatus, ProgressCallback, TaskHandle, WorkerPool};
