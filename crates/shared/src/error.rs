use std::{
  backtrace::{Backtrace, BacktraceStatus},
  fmt::Display,
};

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

/// Stable error codes of the public JSON error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum ErrorCode {
  #[serde(rename = "INVALID_PARAMETER")]
  InvalidParameter,
  #[serde(rename = "BEAN_NOT_FOUND")]
  BeanNotFound,
  #[serde(rename = "PERMISSION_DENIED")]
  PermissionDenied,
  #[serde(rename = "SYSTEM_ERROR")]
  SystemError,
}

/// Carried in response extensions so the envelope middleware can attach
/// the request path before serializing.
#[derive(Debug, Clone)]
pub struct ErrorBody {
  pub code: ErrorCode,
  pub message: String,
}

#[derive(Debug)]
pub struct AppError {
  err: anyhow::Error,
  status_code: StatusCode,
  code: ErrorCode,
}

impl AppError {
  /// Create with 500 status
  pub fn new<E: Into<anyhow::Error>>(err: E) -> Self {
    Self {
      err: err.into(),
      status_code: StatusCode::INTERNAL_SERVER_ERROR,
      code: ErrorCode::SystemError,
    }
  }

  /// Create with custom status
  pub fn with_status<E: Into<anyhow::Error>>(status: StatusCode, err: E) -> Self {
    let code = match status {
      StatusCode::BAD_REQUEST => ErrorCode::InvalidParameter,
      StatusCode::NOT_FOUND => ErrorCode::BeanNotFound,
      StatusCode::FORBIDDEN => ErrorCode::PermissionDenied,
      _ => ErrorCode::SystemError,
    };
    Self {
      err: err.into(),
      status_code: status,
      code,
    }
  }

  /// 400 with `INVALID_PARAMETER`
  pub fn invalid_parameter<E: Into<anyhow::Error>>(err: E) -> Self {
    Self::with_status(StatusCode::BAD_REQUEST, err)
  }

  /// 404 with `BEAN_NOT_FOUND`
  pub fn not_found<E: Into<anyhow::Error>>(err: E) -> Self {
    Self::with_status(StatusCode::NOT_FOUND, err)
  }

  #[must_use]
  pub const fn status_code(&self) -> StatusCode {
    self.status_code
  }

  #[must_use]
  pub const fn code(&self) -> ErrorCode {
    self.code
  }

  /// Get backtrace from anyhow (requires `RUST_BACKTRACE=1` to capture)
  pub fn backtrace(&self) -> &Backtrace {
    self.err.backtrace()
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    if cfg!(debug_assertions) {
      let bt = self.err.backtrace();
      if bt.status() == BacktraceStatus::Captured {
        tracing::error!("{}\nBacktrace:\n{}", self.err, bt);
      } else {
        tracing::error!("{}", self.err);
      }
    }

    let mut response = self.status_code.into_response();
    response.extensions_mut().insert(ErrorBody {
      code: self.code,
      message: self.err.to_string(),
    });
    response
  }
}

impl Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.status_code, self.err)
  }
}

impl<E> From<E> for AppError
where
  E: Into<anyhow::Error>,
{
  fn from(err: E) -> Self {
    Self::new(err)
  }
}
