use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use stratamem_queue::{ConversationBuffer, GroupLock};
use stratamem_shared::{AppError, MemCellKind, RawMessage};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
  BoundaryDetector, BoundaryInput, BoundaryStatus, ExtractionTask, MemCellSink, get_scene,
  mark_memcell_extracted, touch_conversation,
};

/// How many buffered messages boundary detection looks back over.
const HISTORY_LIMIT: usize = 1000;

/// Lock hold budget; covers buffer reads, the oracle call and persistence.
const LOCK_TTL: Duration = Duration::from_secs(60);
const LOCK_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize, Clone, ToSchema)]
pub struct MemorizeRequest {
  pub group_id: String,
  pub group_name: Option<String>,
  pub new_messages: Vec<RawMessage>,
  #[serde(default)]
  pub kind: MemCellKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
  /// A boundary was cut; the MemCell is persisted and queued for
  /// extraction under the returned request id.
  Submitted,
  /// Messages were appended to the rolling window.
  Accumulated,
}

/// Orchestrates buffer → boundary detector → MemCell persistence →
/// worker submission, serialized per group by an advisory Redis lock.
pub struct IngestionPipeline {
  db: DatabaseConnection,
  buffer: ConversationBuffer,
  lock: GroupLock,
  detector: BoundaryDetector,
  sink: Arc<dyn MemCellSink>,
}

impl IngestionPipeline {
  pub fn new(
    db: DatabaseConnection,
    buffer: ConversationBuffer,
    lock: GroupLock,
    detector: BoundaryDetector,
    sink: Arc<dyn MemCellSink>,
  ) -> Self {
    Self {
      db,
      buffer,
      lock,
      detector,
      sink,
    }
  }

  pub async fn memorize(
    &self,
    request: &MemorizeRequest,
  ) -> Result<(Option<Uuid>, IngestOutcome), AppError> {
    if request.new_messages.is_empty() {
      return Err(AppError::invalid_parameter(anyhow!("no new messages")));
    }

    // Two in-flight calls for the same group (e.g. during a rebalance
    // overlap) must not both cut a MemCell.
    let Some(guard) = self
      .lock
      .acquire(&request.group_id, LOCK_TTL, LOCK_WAIT)
      .await?
    else {
      return Err(AppError::new(anyhow!(
        "group {} is locked by another memorize call",
        request.group_id
      )));
    };

    let result = self.memorize_locked(request).await;
    self.lock.release(guard).await?;
    result
  }

  async fn memorize_locked(
    &self,
    request: &MemorizeRequest,
  ) -> Result<(Option<Uuid>, IngestOutcome), AppError> {
    let history = self.buffer.get(&request.group_id, HISTORY_LIMIT).await?;

    let (cell, status) = self
      .detector
      .decide(BoundaryInput {
        history: &history,
        new: &request.new_messages,
        group_id: &request.group_id,
        group_name: request.group_name.as_deref(),
        kind: request.kind,
      })
      .await?;

    let Some(cell) = cell else {
      self.buffer.append(&request.group_id, &request.new_messages).await?;

      let newest = request
        .new_messages
        .iter()
        .map(|m| m.created_at)
        .max()
        .unwrap_or_else(Utc::now);
      touch_conversation(
        &request.group_id,
        newest.max(Utc::now()),
        status == BoundaryStatus::Wait,
        &self.db,
      )
      .await?;

      return Ok((None, IngestOutcome::Accumulated));
    };

    // The next window starts from whatever the cut did not consume.
    let cell_end = cell.timestamp;
    self.buffer.clear(&request.group_id).await?;
    let carry_over: Vec<RawMessage> = request
      .new_messages
      .iter()
      .filter(|m| m.created_at > cell_end)
      .cloned()
      .collect();
    self.buffer.append(&request.group_id, &carry_over).await?;

    let memcell = cell.insert(&self.db).await?;
    info!(
      group_id = %request.group_id,
      event_id = %memcell.id,
      messages = memcell.original_data.len(),
      "memcell persisted"
    );

    let scene = get_scene(&request.group_id, &self.db).await?;
    let request_id = memcell.id;
    if let Err(err) = self.sink.submit(ExtractionTask {
      request_id,
      memcell: memcell.clone(),
      scene,
    }) {
      // The MemCell stays persisted for later reprocessing.
      warn!(event_id = %request_id, error = %err, "worker submission failed");
      return Err(err);
    }

    mark_memcell_extracted(&request.group_id, cell_end, &self.db).await?;

    Ok((Some(request_id), IngestOutcome::Submitted))
  }
}
