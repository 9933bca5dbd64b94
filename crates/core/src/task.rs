use stratamem_shared::{AppError, Scene};
use uuid::Uuid;

use crate::MemCell;

/// One unit of work for the extraction worker.
#[derive(Debug, Clone)]
pub struct ExtractionTask {
  pub request_id: Uuid,
  pub memcell: MemCell,
  pub scene: Scene,
}

/// Where the ingestion pipeline hands finished MemCells off to.
///
/// `submit` must be non-blocking: it either enqueues and returns the
/// request id, or fails fast when the worker's pending queue is full.
pub trait MemCellSink: Send + Sync {
  fn submit(&self, task: ExtractionTask) -> Result<Uuid, AppError>;
}
