use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single inbound conversation message. Immutable once received.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct RawMessage {
  pub message_id: String,
  pub group_id: String,
  pub sender_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sender_name: Option<String>,
  pub content: String,
  pub created_at: DateTime<Utc>,
  /// Ids of messages this one replies to or quotes.
  #[serde(default)]
  pub refers_to: Vec<String>,
}

/// Conversation scene, set via conversation meta. Drives the extraction
/// fan-out plan (assistant scenes clone the group episode per user
/// instead of extracting personal episodes).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scene {
  #[default]
  Assistant,
  Companion,
  GroupChat,
  Other,
}

impl Scene {
  #[must_use]
  pub const fn is_assistant(self) -> bool {
    matches!(self, Self::Assistant | Self::Companion)
  }
}

/// What kind of raw data a MemCell was cut from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemCellKind {
  #[default]
  Conversation,
  Linkdoc,
}
