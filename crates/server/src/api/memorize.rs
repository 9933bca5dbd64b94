use anyhow::anyhow;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratamem_core::{IngestOutcome, MemorizeRequest};
use stratamem_queue::QueueItem;
use stratamem_shared::{AppError, RawMessage};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

/// One inbound chat message in the public wire shape.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct MemorizeMessage {
  pub group_id: Option<String>,
  pub group_name: Option<String>,
  pub message_id: String,
  pub create_time: DateTime<Utc>,
  pub sender: String,
  pub sender_name: Option<String>,
  pub content: String,
  #[serde(default)]
  pub refer_list: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemorizeResult {
  pub request_id: Option<Uuid>,
  /// "submitted" when a boundary was cut, "accumulated" otherwise.
  pub status_info: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemorizeResponse {
  pub status: String,
  pub message: String,
  pub result: MemorizeResult,
}

fn into_memorize_request(message: MemorizeMessage) -> MemorizeRequest {
  let group_id = message
    .group_id
    .clone()
    .unwrap_or_else(|| "default".to_owned());

  MemorizeRequest {
    group_id: group_id.clone(),
    group_name: message.group_name.clone(),
    new_messages: vec![RawMessage {
      message_id: message.message_id,
      group_id,
      sender_id: message.sender,
      sender_name: message.sender_name,
      content: message.content,
      created_at: message.create_time,
      refers_to: message.refer_list,
    }],
    kind: Default::default(),
  }
}

/// Store a single conversation message
#[utoipa::path(
  post,
  path = "/api/v1/memorize",
  request_body = MemorizeMessage,
  responses(
    (status = 200, description = "Message accepted", body = MemorizeResponse),
    (status = 400, description = "Invalid message payload")
  )
)]
#[axum::debug_handler]
pub async fn memorize(
  State(state): State<AppState>,
  Json(payload): Json<serde_json::Value>,
) -> Result<Json<MemorizeResponse>, AppError> {
  let message: MemorizeMessage = serde_json::from_value(payload)
    .map_err(|err| AppError::invalid_parameter(anyhow!("invalid message: {err}")))?;

  if message.message_id.is_empty() || message.sender.is_empty() || message.content.is_empty() {
    return Err(AppError::invalid_parameter(anyhow!(
      "message_id, sender and content are required"
    )));
  }

  let request = into_memorize_request(message);

  // Queue mode: the message rides the partitioned group queue and the
  // consumer loop drives the pipeline. Admission control is the
  // backpressure signal.
  if let Some(queue) = &state.queue {
    let item = QueueItem::new(
      request.group_id.clone(),
      "memorize",
      serde_json::to_value(&request.new_messages[0])?,
    );
    if !queue.deliver(&request.group_id, &item).await? {
      return Err(AppError::new(anyhow!("ingest queue is full, retry later")));
    }
    return Ok(Json(MemorizeResponse {
      status: "ok".to_owned(),
      message: "Message queued, awaiting boundary detection".to_owned(),
      result: MemorizeResult {
        request_id: None,
        status_info: "accumulated".to_owned(),
      },
    }));
  }

  let (request_id, outcome) = state.pipeline.memorize(&request).await?;

  let response = match outcome {
    IngestOutcome::Submitted => MemorizeResponse {
      status: "ok".to_owned(),
      message: "Memory extraction submitted".to_owned(),
      result: MemorizeResult {
        request_id,
        status_info: "submitted".to_owned(),
      },
    },
    IngestOutcome::Accumulated => MemorizeResponse {
      status: "ok".to_owned(),
      message: "Message queued, awaiting boundary detection".to_owned(),
      result: MemorizeResult {
        request_id: None,
        status_info: "accumulated".to_owned(),
      },
    },
  };

  Ok(Json(response))
}
