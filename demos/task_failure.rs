use request_queue::{QueueError, RequestQueue, TaskCompletionInfo};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  let queue = RequestQueue::new(1, Handle::current(), "failure_demo");
  queue.add_completion_handler(|info: TaskCompletionInfo| {
    info!(
      "Notification: task {} finished with {:?} after {:?} queued, {:?} running",
      info.task_seq, info.status, info.queued_for, info.ran_for
    );
  });

  let failing = queue.submit(|| async {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Err::<String, String>("upstream returned 503".to_string())
  });

  let should_panic = true;
  let panicking = queue.submit(move || async move {
    if should_panic {
      panic!("This task is designed to panic!");
    }
    Ok::<String, String>("unreachable".to_string())
  });

  let healthy = queue.submit(|| async { Ok::<String, String>("Hello from the model".to_string()) });

  match failing.await_result().await {
    Err(QueueError::Task(reason)) => info!("Failing task reported its own error: {}", reason),
    other => info!("Failing task resulted in something unexpected: {:?}", other),
  }
  match panicking.await_result().await {
    Err(QueueError::TaskPanicked) => info!("Panicking task correctly resulted in QueueError::TaskPanicked."),
    other => info!("Panicking task resulted in something unexpected: {:?}", other),
  }
  match healthy.await_result().await {
    Ok(text) => info!("Healthy task still ran: {}", text),
    Err(e) => info!("Healthy task failed unexpectedly: {}", e),
  }

  // Give the notification worker a moment to flush.
  tokio::time::sleep(Duration::from_millis(50)).await;
}
