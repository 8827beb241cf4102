use crate::error::QueueError;
use crate::task::TaskSeq;

use tokio::sync::oneshot;

/// A handle to a task submitted to a [`RequestQueue`](crate::RequestQueue).
///
/// The task runs whether or not the handle is awaited. Dropping the handle only
/// discards the outcome.
#[derive(Debug)]
pub struct TaskHandle<T, E> {
  pub(crate) task_seq: TaskSeq,
  pub(crate) result_receiver: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
  /// Returns the task's position in its queue's submission order.
  pub fn seq(&self) -> TaskSeq {
    self.task_seq
  }

  /// Awaits the task's settlement.
  ///
  /// The success value is returned exactly as the task produced it, and a task
  /// error comes back as `QueueError::Task` holding the original value.
  ///
  /// # Errors
  /// Returns `QueueError::Task` if the task returned an error.
  /// Returns `QueueError::TaskPanicked` if the task panicked during execution.
  /// Returns `QueueError::ResultChannelClosed` if the task was dropped without
  /// running to completion, which only happens when the runtime shuts down.
  pub async fn await_result(self) -> Result<T, QueueError<E>> {
    match self.result_receiver.await {
      Ok(task_outcome_result) => task_outcome_result,
      Err(recv_error) => {
        tracing::warn!(task_seq = %self.task_seq, "Result channel receive error: {}", recv_error);
        Err(QueueError::ResultChannelClosed)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn closed_channel_maps_to_queue_error() {
    let (tx, rx) = oneshot::channel::<Result<(), QueueError<String>>>();
    let handle = TaskHandle { task_seq: 3, result_receiver: rx };
    assert_eq!(handle.seq(), 3);
    drop(tx);
    assert_eq!(handle.await_result().await, Err(QueueError::ResultChannelClosed));
  }
}
