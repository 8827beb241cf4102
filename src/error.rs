use thiserror::Error;

/// Errors surfaced through a [`TaskHandle`](crate::TaskHandle).
///
/// The queue itself never rejects a submission. `Task` carries the task's own
/// failure exactly as the task returned it.
#[derive(Error, Debug, PartialEq)]
pub enum QueueError<E> {
  #[error("Task failed: {0}")]
  Task(E),

  #[error("Submitted task future panicked")]
  TaskPanicked,

  #[error("Task result channel closed before an outcome was delivered (runtime shut down?)")]
  ResultChannelClosed,
}

impl<E> QueueError<E> {
  /// Returns the task's own error, if that is what this is.
  pub fn into_task_error(self) -> Option<E> {
    match self {
      QueueError::Task(err) => Some(err),
      _ => None,
    }
  }

  pub fn is_task_failure(&self) -> bool {
    matches!(self, QueueError::Task(_))
  }
}
