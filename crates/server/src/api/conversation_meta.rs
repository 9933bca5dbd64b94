use anyhow::anyhow;
use axum::{Json, extract::State};
use serde::Serialize;
use stratamem_core::{ConversationMetaRecord, upsert_conversation_meta};
use stratamem_shared::AppError;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationMetaResponse {
  pub status: String,
  pub message: String,
  pub result: ConversationMetaResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationMetaResult {
  pub id: Uuid,
  pub group_id: String,
  pub scene: String,
  pub name: String,
  pub version: String,
}

/// Upsert conversation metadata by group id
#[utoipa::path(
  post,
  path = "/api/v1/conversation-meta",
  request_body = ConversationMetaRecord,
  responses(
    (status = 200, description = "Metadata saved", body = ConversationMetaResponse),
    (status = 400, description = "Invalid metadata payload")
  )
)]
#[axum::debug_handler]
pub async fn save_conversation_meta(
  State(state): State<AppState>,
  Json(payload): Json<serde_json::Value>,
) -> Result<Json<ConversationMetaResponse>, AppError> {
  let record: ConversationMetaRecord = serde_json::from_value(payload)
    .map_err(|err| AppError::invalid_parameter(anyhow!("invalid metadata: {err}")))?;

  if record.group_id.is_empty() {
    return Err(AppError::invalid_parameter(anyhow!("group_id is required")));
  }

  let model = upsert_conversation_meta(&record, &state.db).await?;

  Ok(Json(ConversationMetaResponse {
    status: "ok".to_owned(),
    message: "Conversation metadata saved successfully".to_owned(),
    result: ConversationMetaResult {
      id: model.id,
      group_id: model.group_id,
      scene: model.scene,
      name: model.name,
      version: model.version,
    },
  }))
}
