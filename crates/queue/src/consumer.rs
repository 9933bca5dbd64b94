use std::sync::Arc;
use std::time::Duration;

use stratamem_shared::{APP_ENV, AppError};
use tracing::{error, info};
use uuid::Uuid;

use crate::{GroupQueueManager, QueueItem};

/// Idle wait between empty polls.
const POLL_IDLE: Duration = Duration::from_millis(200);

/// One consumer instance of the partitioned group queue: joins as an
/// owner, keeps itself alive, drains its partitions, and hands every
/// item to the provided handler.
pub struct QueueConsumer {
  manager: Arc<GroupQueueManager>,
  owner_id: String,
}

impl QueueConsumer {
  pub fn new(manager: Arc<GroupQueueManager>) -> Self {
    let owner_id = format!("consumer-{}", Uuid::new_v4());
    Self { manager, owner_id }
  }

  #[must_use]
  pub fn owner_id(&self) -> &str {
    &self.owner_id
  }

  /// Run until `shutdown` resolves. Handler failures are logged and do
  /// not stop the loop; the queue is at-least-once.
  pub async fn run<F, Fut>(self, handler: F, shutdown: impl Future<Output = ()>) -> Result<(), AppError>
  where
    F: Fn(QueueItem) -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
  {
    self.manager.join_consumer(&self.owner_id).await?;
    info!(owner_id = %self.owner_id, "queue consumer started");

    let score_threshold = Duration::from_millis(APP_ENV.pgq_score_threshold_ms);
    let keepalive_every = self.manager.config().inactive_threshold / 3;
    let mut keepalive = tokio::time::interval(keepalive_every.max(Duration::from_secs(1)));
    let mut cleanup = tokio::time::interval(self.manager.config().inactive_threshold);
    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        () = &mut shutdown => break,
        _ = keepalive.tick() => {
          if let Err(err) = self.manager.keepalive_consumer(&self.owner_id).await {
            error!(error = %err, "keepalive failed");
          }
        }
        _ = cleanup.tick() => {
          if let Err(err) = self.manager.cleanup_inactive_owners().await {
            error!(error = %err, "inactive-owner cleanup failed");
          }
        }
        result = self.manager.get_messages(&self.owner_id, score_threshold) => {
          match result {
            Ok(items) if items.is_empty() => tokio::time::sleep(POLL_IDLE).await,
            Ok(items) => {
              for item in items {
                let item_id = item.id;
                if let Err(err) = handler(item).await {
                  error!(%item_id, error = %err, "queue item handler failed");
                }
              }
            }
            Err(err) => {
              error!(error = %err, "queue poll failed");
              tokio::time::sleep(POLL_IDLE).await;
            }
          }
        }
      }
    }

    self.manager.exit_consumer(&self.owner_id).await?;
    info!(owner_id = %self.owner_id, "queue consumer stopped");
    Ok(())
  }
}
