use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use stratamem_core::{ClusterManager, ExtractionTask, MemCellSink, MemoryStore};
use stratamem_shared::{APP_ENV, AppError};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::process::process_task;
use crate::status::StatusMap;
use crate::RequestStatus;

/// Submission side of the extraction worker. Cheap to clone; lives in
/// the server state and inside the ingestion pipeline.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::Sender<ExtractionTask>,
  status: Arc<StatusMap>,
}

impl WorkerHandle {
  pub fn status_of(&self, request_id: Uuid) -> Option<RequestStatus> {
    self.status.get(request_id)
  }
}

impl MemCellSink for WorkerHandle {
  /// Non-blocking submit: enqueue or fail fast when the pending queue is
  /// at capacity.
  fn submit(&self, task: ExtractionTask) -> Result<Uuid, AppError> {
    let request_id = task.request_id;
    self.status.set(request_id, RequestStatus::Pending);

    self.tx.try_send(task).map_err(|err| match err {
      mpsc::error::TrySendError::Full(_) => {
        self.status.set(request_id, RequestStatus::Failed);
        AppError::new(anyhow!(
          "extraction worker queue is full ({} pending)",
          APP_ENV.ew_max_pending
        ))
      }
      mpsc::error::TrySendError::Closed(_) => {
        self.status.set(request_id, RequestStatus::Failed);
        AppError::new(anyhow!("extraction worker is not running"))
      }
    })?;

    Ok(request_id)
  }
}

/// Process-wide extraction worker: a bounded queue drained by a single
/// consumer task. One MemCell is processed at a time, in submit order.
pub struct ExtractionWorker {
  handle: WorkerHandle,
  shutdown: watch::Sender<bool>,
  join: tokio::task::JoinHandle<()>,
}

impl ExtractionWorker {
  pub fn start(store: MemoryStore, clusters: Arc<ClusterManager>) -> Self {
    let (tx, rx) = mpsc::channel(APP_ENV.ew_max_pending);
    let status = Arc::new(StatusMap::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = WorkerHandle {
      tx,
      status: Arc::clone(&status),
    };

    let join = tokio::spawn(consume(rx, shutdown_rx, status, store, clusters));
    info!(max_pending = APP_ENV.ew_max_pending, "extraction worker started");

    Self {
      handle,
      shutdown: shutdown_tx,
      join,
    }
  }

  #[must_use]
  pub fn handle(&self) -> WorkerHandle {
    self.handle.clone()
  }

  /// Signal shutdown and wait for the in-flight task to finish.
  pub async fn stop(self, timeout: Duration) {
    let _ = self.shutdown.send(true);
    if tokio::time::timeout(timeout, self.join).await.is_err() {
      warn!("extraction worker did not stop within {timeout:?}");
    } else {
      info!("extraction worker stopped");
    }
  }
}

async fn consume(
  mut rx: mpsc::Receiver<ExtractionTask>,
  mut shutdown: watch::Receiver<bool>,
  status: Arc<StatusMap>,
  store: MemoryStore,
  clusters: Arc<ClusterManager>,
) {
  let deadline = Duration::from_secs(APP_ENV.ew_task_deadline_sec);

  loop {
    let task = tokio::select! {
      task = rx.recv() => match task {
        Some(task) => task,
        None => break,
      },
      _ = shutdown.changed() => break,
    };

    let request_id = task.request_id;
    status.set(request_id, RequestStatus::Processing);

    // The deadline bounds one task's wall clock. Whatever its stages
    // persisted before the cutoff stays persisted.
    match tokio::time::timeout(deadline, process_task(&task, &store, &clusters)).await {
      Ok(Ok(())) => status.set(request_id, RequestStatus::Completed),
      Ok(Err(err)) => {
        error!(%request_id, error = %err, "extraction task failed");
        status.set(request_id, RequestStatus::Failed);
      }
      Err(_) => {
        error!(%request_id, deadline = ?deadline, "extraction task hit its deadline");
        status.set(request_id, RequestStatus::Failed);
      }
    }
  }

  info!("extraction worker consumer exited");
}
