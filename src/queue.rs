use crate::error::QueueError;
use crate::handle::TaskHandle;
use crate::notifier::{CompletionNotifier, InternalCompletionMessage, TaskCompletionInfo, TaskCompletionStatus};
use crate::task::{PendingEntry, TaskSeq};

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Ceiling used by [`RequestQueue::with_default_limit`].
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 3;

/// Whether a drain cycle is currently running for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
  Idle,
  Draining,
}

struct QueueState {
  pending: VecDeque<PendingEntry>,
  executing: usize,
  drain: DrainState,
  next_task_seq: TaskSeq,
}

/// Admission control for outbound work: at most `concurrency_limit` tasks run
/// at once, the rest wait in FIFO order. Submissions are never rejected.
pub struct RequestQueue {
  queue_name: Arc<String>,
  concurrency_limit: usize,
  state: Mutex<QueueState>,
  tokio_handle: TokioHandle,
  notifier: CompletionNotifier,
}

impl fmt::Debug for RequestQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("RequestQueue")
      .field("queue_name", &self.queue_name)
      .field("concurrency_limit", &self.concurrency_limit)
      .field("pending", &state.pending.len())
      .field("executing", &state.executing)
      .field("drain", &state.drain)
      .field("notifier", &self.notifier)
      .finish()
  }
}

/// Holds one of the queue's execution slots; gives it back on drop.
struct ExecutionSlot {
  queue: Arc<RequestQueue>,
}

impl Drop for ExecutionSlot {
  fn drop(&mut self) {
    let mut state = self.queue.state.lock();
    state.executing = state.executing.saturating_sub(1);
  }
}

impl RequestQueue {
  pub fn new(concurrency_limit: usize, tokio_handle: TokioHandle, queue_name: &str) -> Arc<Self> {
    if concurrency_limit == 0 {
      warn!(queue_name, "Concurrency limit of 0 requested; using 1.");
    }
    let queue_name = Arc::new(queue_name.to_string());

    Arc::new(Self {
      queue_name: queue_name.clone(),
      concurrency_limit: concurrency_limit.max(1),
      state: Mutex::new(QueueState {
        pending: VecDeque::new(),
        executing: 0,
        drain: DrainState::Idle,
        next_task_seq: 0,
      }),
      notifier: CompletionNotifier::new(tokio_handle.clone(), queue_name),
      tokio_handle,
    })
  }

  pub fn with_default_limit(tokio_handle: TokioHandle, queue_name: &str) -> Arc<Self> {
    Self::new(DEFAULT_CONCURRENCY_LIMIT, tokio_handle, queue_name)
  }

  pub fn name(&self) -> &str {
    &self.queue_name
  }

  pub fn concurrency_limit(&self) -> usize {
    self.concurrency_limit
  }

  /// Number of tasks that have been started and not yet settled.
  pub fn executing_task_count(&self) -> usize {
    self.state.lock().executing
  }

  /// Returns the current number of tasks in the pending sequence.
  pub fn pending_task_count(&self) -> usize {
    self.state.lock().pending.len()
  }

  pub fn drain_state(&self) -> DrainState {
    self.state.lock().drain
  }

  /// Registers a callback invoked (on a spawned task) after every task settles.
  pub fn add_completion_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.notifier.add_handler(handler);
  }

  /// Appends `task` to the pending sequence and triggers a drain cycle.
  ///
  /// `task` is invoked only once a slot is free and every task submitted
  /// before it has been started. The returned handle settles with the task's
  /// own outcome.
  pub fn submit<F, Fut, T, E>(self: &Arc<Self>, task: F) -> TaskHandle<T, E>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
  {
    let (result_tx, result_rx) = oneshot::channel::<Result<T, QueueError<E>>>();

    // Sequence number and position in the pending sequence are assigned together.
    let task_seq = {
      let mut state = self.state.lock();
      let task_seq = state.next_task_seq;
      state.next_task_seq += 1;
      state.pending.push_back(PendingEntry::new(task_seq, task, result_tx));
      debug!(
        queue_name = %self.queue_name,
        %task_seq,
        pending = state.pending.len(),
        executing = state.executing,
        "Task appended to pending sequence."
      );
      task_seq
    };

    self.drain();

    TaskHandle {
      task_seq,
      result_receiver: result_rx,
    }
  }

  /// Starts pending tasks until the sequence is empty or the ceiling is
  /// reached. A call made while another cycle is active returns immediately;
  /// the active cycle re-checks the state under the lock before going idle, so
  /// the new work is never missed.
  fn drain(self: &Arc<Self>) {
    {
      let mut state = self.state.lock();
      if state.drain == DrainState::Draining {
        trace!(queue_name = %self.queue_name, "Drain already in progress; new work left to the active cycle.");
        return;
      }
      state.drain = DrainState::Draining;
    }
    trace!(queue_name = %self.queue_name, "Drain cycle started.");

    loop {
      let entry = {
        let mut state = self.state.lock();
        let next = if state.executing < self.concurrency_limit {
          state.pending.pop_front()
        } else {
          None
        };
        match next {
          Some(entry) => {
            state.executing += 1;
            entry
          }
          None => {
            state.drain = DrainState::Idle;
            trace!(
              queue_name = %self.queue_name,
              pending = state.pending.len(),
              executing = state.executing,
              "Drain cycle finished."
            );
            break;
          }
        }
      };

      self.start(entry);
    }
  }

  /// Spawns an already-admitted entry. Its slot is released when it settles,
  /// after which another drain cycle runs.
  fn start(self: &Arc<Self>, entry: PendingEntry) {
    let PendingEntry { task_seq, enqueued_at, job } = entry;
    let queued_for = enqueued_at.elapsed();
    debug!(
      queue_name = %self.queue_name,
      %task_seq,
      queued_ms = queued_for.as_millis() as u64,
      "Dequeued task. Starting execution."
    );

    let slot = ExecutionSlot { queue: Arc::clone(self) };
    let queue = Arc::clone(self);

    self.tokio_handle.spawn(
      async move {
        let started_at = Instant::now();
        let status = job.await;
        let ran_for = started_at.elapsed();

        match &status {
          TaskCompletionStatus::Success => {
            trace!(queue_name = %queue.queue_name, %task_seq, "Task executed successfully.");
          }
          TaskCompletionStatus::Failed => {
            warn!(queue_name = %queue.queue_name, %task_seq, "Task failed. Continuing to drain.");
          }
          TaskCompletionStatus::Panicked => {
            error!(queue_name = %queue.queue_name, %task_seq, "Task panicked during execution. Continuing to drain.");
          }
        }

        drop(slot);
        queue.drain();

        queue
          .notifier
          .notify(InternalCompletionMessage {
            task_seq,
            queue_name: queue.queue_name.clone(),
            status,
            queued_for,
            ran_for,
          })
          .await;
      }
      .instrument(info_span!("queued_task", queue_name = %*self.queue_name, %task_seq)),
    );
  }

  /// The sequence number the next submission will receive.
  pub fn next_task_seq(&self) -> TaskSeq {
    self.state.lock().next_task_seq
  }
}

impl Drop for RequestQueue {
  fn drop(&mut self) {
    let state = self.state.get_mut();
    if state.pending.is_empty() {
      trace!(queue_name = %*self.queue_name, "RequestQueue dropped with an empty pending sequence.");
    } else {
      // Dropping the entries drops their result senders; the handles see ResultChannelClosed.
      info!(
        queue_name = %*self.queue_name,
        "RequestQueue dropped with {} pending tasks; their handles will report a closed result channel.",
        state.pending.len()
      );
    }
  }
}
