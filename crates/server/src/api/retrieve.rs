use anyhow::anyhow;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use stratamem_ai::LlmConfig;
use stratamem_core::{
  AgenticParams, DataSource, LightweightParams, RetrievalMode, RetrievalResult,
  extraction::parse_loose_instant,
};
use stratamem_shared::AppError;
use utoipa::ToSchema;

use crate::utils::AppState;

const fn default_time_range_days() -> i64 {
  365
}

const fn default_top_k() -> usize {
  20
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetrieveLightweightRequest {
  pub query: Option<String>,
  pub user_id: Option<String>,
  pub group_id: Option<String>,
  #[serde(default = "default_time_range_days")]
  pub time_range_days: i64,
  #[serde(default = "default_top_k")]
  pub top_k: usize,
  #[serde(default)]
  pub retrieval_mode: RetrievalMode,
  #[serde(default)]
  pub data_source: DataSource,
  /// Foresight validity instant, `YYYY-MM-DD` or RFC 3339.
  pub current_time: Option<String>,
  /// Cosine similarity floor for the vector arm (episode, semantic,
  /// foresight; event_log ignores it).
  pub radius: Option<f32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LlmConfigRequest {
  pub api_key: Option<String>,
  pub base_url: Option<String>,
  pub model: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RetrieveAgenticRequest {
  pub query: String,
  pub user_id: Option<String>,
  pub group_id: Option<String>,
  #[serde(default = "default_time_range_days")]
  pub time_range_days: i64,
  #[serde(default = "default_top_k")]
  pub top_k: usize,
  #[serde(default)]
  pub data_source: DataSource,
  pub llm_config: Option<LlmConfigRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetrieveResponse {
  pub status: String,
  pub message: String,
  pub result: RetrievalResult,
}

fn wrap(result: RetrievalResult) -> Json<RetrieveResponse> {
  Json(RetrieveResponse {
    status: "ok".to_owned(),
    message: format!("Retrieval successful, found {} memories", result.count),
    result,
  })
}

/// Lightweight memory retrieval (BM25 / embedding / RRF fusion)
#[utoipa::path(
  post,
  path = "/api/v1/retrieve_lightweight",
  request_body = RetrieveLightweightRequest,
  responses(
    (status = 200, description = "Retrieved memories", body = RetrieveResponse),
    (status = 400, description = "Invalid parameters")
  )
)]
#[axum::debug_handler]
pub async fn retrieve_lightweight(
  State(state): State<AppState>,
  Json(payload): Json<serde_json::Value>,
) -> Result<Json<RetrieveResponse>, AppError> {
  let request: RetrieveLightweightRequest = serde_json::from_value(payload)
    .map_err(|err| AppError::invalid_parameter(anyhow!("invalid request: {err}")))?;

  let current_time = match request.current_time.as_deref() {
    Some(raw) => Some(parse_loose_instant(Some(raw)).ok_or_else(|| {
      AppError::invalid_parameter(anyhow!("current_time must be YYYY-MM-DD or RFC 3339"))
    })?),
    None => None,
  };

  let params = LightweightParams {
    query: request.query,
    user_id: request.user_id,
    group_id: request.group_id,
    time_range_days: Some(request.time_range_days),
    top_k: request.top_k,
    retrieval_mode: request.retrieval_mode,
    data_source: request.data_source,
    current_time,
    radius: request.radius,
  };

  let result = state.engine.retrieve_lightweight(&params).await?;
  Ok(wrap(result))
}

/// Agentic memory retrieval (LLM-guided multi-round)
#[utoipa::path(
  post,
  path = "/api/v1/retrieve_agentic",
  request_body = RetrieveAgenticRequest,
  responses(
    (status = 200, description = "Retrieved memories", body = RetrieveResponse),
    (status = 400, description = "Invalid parameters")
  )
)]
#[axum::debug_handler]
pub async fn retrieve_agentic(
  State(state): State<AppState>,
  Json(payload): Json<serde_json::Value>,
) -> Result<Json<RetrieveResponse>, AppError> {
  let request: RetrieveAgenticRequest = serde_json::from_value(payload)
    .map_err(|err| AppError::invalid_parameter(anyhow!("invalid request: {err}")))?;

  if request.query.trim().is_empty() {
    return Err(AppError::invalid_parameter(anyhow!("query is required")));
  }

  let llm = request
    .llm_config
    .map(|config| LlmConfig {
      api_key: config.api_key,
      base_url: config.base_url,
      model: config.model,
    })
    .unwrap_or_default();

  let params = AgenticParams {
    query: request.query,
    user_id: request.user_id,
    group_id: request.group_id,
    time_range_days: Some(request.time_range_days),
    top_k: request.top_k,
    data_source: request.data_source,
    llm,
  };

  let result = state.engine.retrieve_agentic(&params).await?;
  Ok(wrap(result))
}
