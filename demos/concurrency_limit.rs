use request_queue::{RequestQueue, TaskHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

/// Stands in for one outbound completion call.
async fn completion_call(id: usize) -> Result<String, String> {
  info!("Request {} sent upstream (takes 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("Request {} answered", id);
  info!("{}", result);
  Ok(result)
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,request_queue=debug")),
    )
    .with_target(false)
    .init();

  let queue = RequestQueue::with_default_limit(Handle::current(), "completion_calls");
  let num_requests = 7;

  info!(
    "Submitting {} requests, each takes 1 sec. With ceiling {}, this should take ~{} secs.",
    num_requests,
    queue.concurrency_limit(),
    (num_requests as f32 / queue.concurrency_limit() as f32).ceil()
  );

  let handles: Vec<TaskHandle<String, String>> = (0..num_requests)
    .map(|id| queue.submit(move || completion_call(id)))
    .collect();

  info!(
    "Executing: {}, pending: {}",
    queue.executing_task_count(),
    queue.pending_task_count()
  );

  for handle in handles {
    let task_seq = handle.seq();
    match handle.await_result().await {
      Ok(result) => info!("Task {} main: Received result: {}", task_seq, result),
      Err(e) => info!("Task {} main: Received error: {}", task_seq, e),
    }
  }

  info!("All requests settled.");
}
