use axum::{
  extract::Request,
  middleware::Next,
  response::{IntoResponse, Response},
};
use chrono::Utc;
use stratamem_shared::ErrorBody;

/// Rewraps handler errors into the stable JSON error envelope, attaching
/// the request path:
/// `{status, code, message, timestamp, path}`.
pub async fn error_envelope(request: Request, next: Next) -> Response {
  let path = request.uri().path().to_owned();
  let mut response = next.run(request).await;

  if let Some(body) = response.extensions_mut().remove::<ErrorBody>() {
    let envelope = serde_json::json!({
      "status": "failed",
      "code": body.code,
      "message": body.message,
      "timestamp": Utc::now(),
      "path": path,
    });
    return (response.status(), axum::Json(envelope)).into_response();
  }

  response
}
