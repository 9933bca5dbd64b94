use std::sync::Arc;

use sea_orm::DatabaseConnection;
use stratamem_core::{IngestionPipeline, RetrievalEngine};
use stratamem_queue::GroupQueueManager;
use stratamem_worker::WorkerHandle;

#[derive(Clone)]
pub struct AppState {
  pub db: DatabaseConnection,
  pub pipeline: Arc<IngestionPipeline>,
  pub engine: RetrievalEngine,
  pub worker: WorkerHandle,
  /// Present when ingest is routed through the partitioned group queue.
  pub queue: Option<Arc<GroupQueueManager>>,
}

impl AppState {
  #[must_use]
  pub fn new(
    db: DatabaseConnection,
    pipeline: Arc<IngestionPipeline>,
    engine: RetrievalEngine,
    worker: WorkerHandle,
    queue: Option<Arc<GroupQueueManager>>,
  ) -> Self {
    Self {
      db,
      pipeline,
      engine,
      worker,
      queue,
    }
  }
}
