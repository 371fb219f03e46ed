//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use sward_core::{Classify, ErrorKind, validation::Rejection};
use thiserror::Error;

/// Message returned by every route while referrals are switched off.
pub const DISABLED_MESSAGE: &str = "This feature is not available in your environment";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unprocessable: {0}")]
  Unprocessable(String),

  /// A referral business rule said no; reported with its reason code.
  #[error("{}", .0.message())]
  Rejected(Rejection, StatusCode),

  #[error("unauthorized")]
  Unauthorized,

  #[error("referrals are disabled")]
  Disabled,

  #[error("ledger error: {0}")]
  Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a ledger failure onto a response category.
  pub fn ledger<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    if let Some(rejection) = e.rejection() {
      return Self::Rejected(rejection, StatusCode::CONFLICT);
    }
    match e.kind() {
      ErrorKind::NotFound => Self::NotFound(e.to_string()),
      ErrorKind::Conflict => Self::Conflict(e.to_string()),
      ErrorKind::Invalid => Self::Unprocessable(e.to_string()),
      ErrorKind::Internal => Self::Ledger(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Rejected(rejection, status) => {
        let body = json!({
          "valid":  false,
          "reason": rejection.reason(),
          "error":  rejection.message(),
        });
        return (*status, Json(body)).into_response();
      }
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"sward\""),
        );
        return res;
      }
      ApiError::Disabled => (StatusCode::NOT_FOUND, DISABLED_MESSAGE.to_owned()),
      ApiError::Ledger(e) => {
        tracing::error!(error = %e, "ledger failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
