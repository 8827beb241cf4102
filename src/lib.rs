//! A Tokio-based admission-control queue for outbound requests.
//!
//! At most a fixed number of submitted tasks execute at once; the rest wait in
//! FIFO order and start as slots free up. Each caller gets back exactly the
//! outcome its own task produced.

mod error;
mod handle;
mod notifier;
mod queue;
mod task;

pub use error::QueueError;
pub use handle::TaskHandle;
pub use notifier::{TaskCompletionInfo, TaskCompletionStatus};
pub use queue::{DrainState, RequestQueue, DEFAULT_CONCURRENCY_LIMIT};
pub use task::TaskSeq;
