use crate::task::TaskSeq;

use fibre::mpsc::{AsyncReceiver, AsyncSender};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Once};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle as TokioHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

// --- Public Event Structs for Handlers ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletionStatus {
  Success,
  /// The task returned its own error.
  Failed,
  Panicked,
}

#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
  pub task_seq: TaskSeq,
  pub queue_name: Arc<String>,
  pub status: TaskCompletionStatus,
  /// Time spent in the pending sequence before a slot opened.
  pub queued_for: Duration,
  pub ran_for: Duration,
  pub completion_time: SystemTime,
}

// --- Internal Message (crate-public) ---
#[derive(Debug)]
pub(crate) struct InternalCompletionMessage {
  pub(crate) task_seq: TaskSeq,
  pub(crate) queue_name: Arc<String>,
  pub(crate) status: TaskCompletionStatus,
  pub(crate) queued_for: Duration,
  pub(crate) ran_for: Duration,
}

type CompletionHandler = Arc<dyn Fn(TaskCompletionInfo) + Send + Sync + 'static>;

// --- CompletionNotifier Struct ---

struct NotifierInternalState {
  internal_rx_for_init: Option<AsyncReceiver<InternalCompletionMessage>>,
  tokio_handle: TokioHandle,
  queue_name_for_logging: Arc<String>,
}

/// Fans task completions out to registered handlers on a lazily started worker.
pub(crate) struct CompletionNotifier {
  tx: AsyncSender<InternalCompletionMessage>,
  handlers: Arc<RwLock<Vec<CompletionHandler>>>,
  init_once: Once,
  internal_state_for_init: Mutex<NotifierInternalState>,
}

impl fmt::Debug for CompletionNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let handler_count = self.handlers.try_read().map_or(0, |guard| guard.len());

    f.debug_struct("CompletionNotifier")
      .field("handler_count", &handler_count)
      .field("initialized", &self.is_active())
      .finish_non_exhaustive()
  }
}

impl CompletionNotifier {
  pub(crate) fn new(tokio_handle: TokioHandle, queue_name_for_logging: Arc<String>) -> Self {
    let (tx, rx) = fibre::mpsc::unbounded_async();
    Self {
      tx,
      handlers: Arc::new(RwLock::new(Vec::new())),
      init_once: Once::new(),
      internal_state_for_init: Mutex::new(NotifierInternalState {
        internal_rx_for_init: Some(rx),
        tokio_handle,
        queue_name_for_logging,
      }),
    }
  }

  /// `true` once a handler has been registered and the worker is running.
  /// Before that, completions are not worth sending.
  pub(crate) fn is_active(&self) -> bool {
    self.init_once.is_completed()
  }

  fn ensure_worker_initialized(&self) {
    self.init_once.call_once(|| {
      let mut state_guard = self.internal_state_for_init.lock();
      if let Some(rx_to_use) = state_guard.internal_rx_for_init.take() {
        info!(queue_name = %*state_guard.queue_name_for_logging, "First completion handler added. Initializing notification worker.");

        let worker_handlers = self.handlers.clone();
        let worker_tokio_handle = state_guard.tokio_handle.clone();
        let worker_queue_name = state_guard.queue_name_for_logging.clone();

        state_guard.tokio_handle.spawn(
          Self::run_notification_worker_loop(rx_to_use, worker_handlers, worker_tokio_handle)
            .instrument(info_span!("notification_worker_loop", queue_name = %*worker_queue_name)),
        );
      } else {
        warn!(queue_name = %*state_guard.queue_name_for_logging, "Notifier initialization: RX already taken.");
      }
    });
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.ensure_worker_initialized();

    let mut handlers_guard = self.handlers.write();
    handlers_guard.push(Arc::new(handler));
    info!(
      queue_name = %*self.internal_state_for_init.lock().queue_name_for_logging,
      "Notifier: Added new completion handler. Total handlers: {}",
      handlers_guard.len()
    );
  }

  pub(crate) async fn notify(&self, message: InternalCompletionMessage) {
    if !self.is_active() {
      return;
    }
    let task_seq = message.task_seq;
    if self.tx.send(message).await.is_err() {
      warn!(%task_seq, "Notifier: Worker input queue closed, completion notification dropped.");
    }
  }

  async fn run_notification_worker_loop(
    mut queue_rx: AsyncReceiver<InternalCompletionMessage>,
    handlers_list_arc: Arc<RwLock<Vec<CompletionHandler>>>,
    tokio_handle_for_spawning_handlers: TokioHandle,
  ) {
    info!("Notification worker started.");

    // recv() only errors once every sender is gone, i.e. the queue was dropped.
    while let Ok(internal_msg_payload) = queue_rx.recv().await {
      trace!(task_seq = %internal_msg_payload.task_seq, "Notification worker: processing message.");

      let handlers_snapshot: Vec<CompletionHandler> = handlers_list_arc.read().clone();
      if handlers_snapshot.is_empty() {
        continue;
      }

      let public_info = TaskCompletionInfo {
        task_seq: internal_msg_payload.task_seq,
        queue_name: internal_msg_payload.queue_name,
        status: internal_msg_payload.status,
        queued_for: internal_msg_payload.queued_for,
        ran_for: internal_msg_payload.ran_for,
        completion_time: SystemTime::now(),
      };

      debug!(
        task_seq = %public_info.task_seq,
        "Dispatching notification to {} handlers.",
        handlers_snapshot.len()
      );

      for handler in handlers_snapshot {
        let info_for_handler = public_info.clone();

        tokio_handle_for_spawning_handlers.spawn(async move {
          let queue_name = info_for_handler.queue_name.clone();
          let task_seq = info_for_handler.task_seq;
          let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(info_for_handler)));
          if result.is_err() {
            error!(
              "A completion handler panicked during execution. Queue: {}, Task seq: {}",
              queue_name, task_seq
            );
          }
        });
      }
    }

    info!("Notification worker stopped (input queue closed and processed).");
  }
}
