use axum::{
  Json, Router, middleware,
  routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::{AppState, error_envelope};

mod conversation_meta;
mod memorize;
mod request_status;
mod retrieve;

pub use conversation_meta::{ConversationMetaResponse, ConversationMetaResult};
pub use memorize::{MemorizeMessage, MemorizeResponse, MemorizeResult};
pub use request_status::{RequestStatusResponse, RequestStatusResult};
pub use retrieve::{
  LlmConfigRequest, RetrieveAgenticRequest, RetrieveLightweightRequest, RetrieveResponse,
};

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Stratamem API",
    version = "0.0.1",
    description = "Layered conversational memory service"
  ),
  paths(
    memorize::memorize,
    retrieve::retrieve_lightweight,
    retrieve::retrieve_agentic,
    conversation_meta::save_conversation_meta,
    request_status::request_status,
  ),
  components(schemas(
    MemorizeMessage,
    MemorizeResponse,
    MemorizeResult,
    RetrieveLightweightRequest,
    RetrieveAgenticRequest,
    RetrieveResponse,
    LlmConfigRequest,
    ConversationMetaResponse,
    ConversationMetaResult,
    RequestStatusResponse,
    RequestStatusResult,
    stratamem_core::RetrievedMemory,
    stratamem_core::RetrievalMetadata,
    stratamem_core::RetrievalResult,
    stratamem_core::ConversationMetaRecord,
    stratamem_core::UserDetail,
    stratamem_shared::RawMessage,
    stratamem_shared::Scene,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route("/api/v1/memorize", post(memorize::memorize))
    .route(
      "/api/v1/retrieve_lightweight",
      post(retrieve::retrieve_lightweight),
    )
    .route("/api/v1/retrieve_agentic", post(retrieve::retrieve_agentic))
    .route(
      "/api/v1/conversation-meta",
      post(conversation_meta::save_conversation_meta),
    )
    .route(
      "/api/v1/request_status/{request_id}",
      get(request_status::request_status),
    )
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
    .layer(middleware::from_fn(error_envelope))
}
