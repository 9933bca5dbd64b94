use anyhow::anyhow;
use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use stratamem_shared::AppError;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestStatusResponse {
  pub status: String,
  pub result: RequestStatusResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestStatusResult {
  pub request_id: Uuid,
  /// pending | processing | completed | failed
  pub request_status: String,
}

/// Look up the extraction status of a submitted MemCell
#[utoipa::path(
  get,
  path = "/api/v1/request_status/{request_id}",
  params(("request_id" = Uuid, Path, description = "Request id returned by /memorize")),
  responses(
    (status = 200, description = "Current status", body = RequestStatusResponse),
    (status = 404, description = "Unknown request id")
  )
)]
#[axum::debug_handler]
pub async fn request_status(
  State(state): State<AppState>,
  Path(request_id): Path<Uuid>,
) -> Result<Json<RequestStatusResponse>, AppError> {
  let Some(status) = state.worker.status_of(request_id) else {
    return Err(AppError::not_found(anyhow!("unknown request id {request_id}")));
  };

  Ok(Json(RequestStatusResponse {
    status: "ok".to_owned(),
    result: RequestStatusResult {
      request_id,
      request_status: format!("{status:?}").to_lowercase(),
    },
  }))
}
