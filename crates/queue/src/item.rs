use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratamem_shared::AppError;
use uuid::Uuid;

/// Envelope for anything routed through the partitioned group queue.
/// The payload stays opaque JSON; the consumer decides what to do with
/// it based on `item_type`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueItem {
  pub id: Uuid,
  pub group_key: String,
  pub item_type: String,
  pub payload: serde_json::Value,
  pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
  pub fn new(group_key: impl Into<String>, item_type: impl Into<String>, payload: serde_json::Value) -> Self {
    Self {
      id: Uuid::now_v7(),
      group_key: group_key.into(),
      item_type: item_type.into(),
      payload,
      enqueued_at: Utc::now(),
    }
  }
}

/// Wire encoding of queue items. Chosen per manager; affects only the
/// bytes stored in the sorted sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemCodec {
  #[default]
  Json,
  Bson,
}

impl ItemCodec {
  pub fn encode(self, item: &QueueItem) -> Result<Vec<u8>, AppError> {
    match self {
      Self::Json => Ok(serde_json::to_vec(item)?),
      Self::Bson => Ok(bson::to_vec(item)?),
    }
  }

  pub fn decode(self, bytes: &[u8]) -> Result<QueueItem, AppError> {
    match self {
      Self::Json => Ok(serde_json::from_slice(bytes)?),
      Self::Bson => Ok(bson::from_slice(bytes)?),
    }
  }
}
