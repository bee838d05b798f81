//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"error": <category>, "detail": <message>}`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use gestiones_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler or extractor.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  /// Malformed path, query string or body.
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => match e {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Forbidden { .. } => StatusCode::FORBIDDEN,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Store(_) | CoreError::Serialization(_) => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }

  fn category(&self) -> &'static str {
    match self {
      ApiError::Unauthorized => "unauthorized",
      ApiError::BadRequest(_) => "validation_error",
      ApiError::Core(e) => e.category(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let detail = if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
      "error interno".to_owned()
    } else {
      self.to_string()
    };

    let mut res =
      (status, Json(json!({ "error": self.category(), "detail": detail }))).into_response();
    if let ApiError::Unauthorized = self {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"gestiones\""),
      );
    }
    res
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}
