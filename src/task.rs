use crate::error::QueueError;
use crate::notifier::TaskCompletionStatus;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::warn;

/// Position of a task in its queue's submission order.
pub type TaskSeq = u64;

/// A task with its result delivery folded in. Resolves to the status the drain
/// loop observes; the caller's outcome has already been sent when it does.
pub(crate) type QueuedJob = BoxFuture<'static, TaskCompletionStatus>;

/// A submitted task waiting in the pending sequence.
pub(crate) struct PendingEntry {
  pub(crate) task_seq: TaskSeq,
  pub(crate) enqueued_at: Instant,
  pub(crate) job: QueuedJob,
}

impl fmt::Debug for PendingEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PendingEntry")
      .field("task_seq", &self.task_seq)
      .field("enqueued_at", &self.enqueued_at)
      .finish_non_exhaustive()
  }
}

impl PendingEntry {
  /// Wraps `task` so that invoking it resolves `result_sender` with the task's
  /// own outcome. The callable is not invoked until the job is first polled.
  pub(crate) fn new<F, Fut, T, E>(
    task_seq: TaskSeq,
    task: F,
    result_sender: oneshot::Sender<Result<T, QueueError<E>>>,
  ) -> Self
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
  {
    let job = async move {
      let outcome = AssertUnwindSafe(async move { task().await }).catch_unwind().await;

      let (status, result) = match outcome {
        Ok(Ok(value)) => (TaskCompletionStatus::Success, Ok(value)),
        Ok(Err(err)) => (TaskCompletionStatus::Failed, Err(QueueError::Task(err))),
        Err(_panic_payload) => (TaskCompletionStatus::Panicked, Err(QueueError::TaskPanicked)),
      };

      if result_sender.send(result).is_err() {
        warn!(%task_seq, "Result receiver for task was dropped. Task outcome may have been lost.");
      }
      status
    };

    Self {
      task_seq,
      enqueued_at: Instant::now(),
      job: job.boxed(),
    }
  }
}
