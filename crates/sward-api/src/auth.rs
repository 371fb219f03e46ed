//! HTTP Basic auth for the operator side of the referral API.
//!
//! Handlers that take an [`Authenticated`] argument are closed to the public:
//! code deactivation, order lookup, use status changes, direct reward
//! creation, reward history, and `POST /uses/:id/settle`, which the payment
//! webhook calls once a referee's order has been paid. Customers never hold
//! these credentials; the public routes (issuing and validating codes,
//! recording a use, reading balances) take no extractor.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use sward_core::ledger::ReferralLedger;

use crate::{AppState, error::ApiError};

/// Operator credentials shared by the admin console and the payment webhook.
#[derive(Clone, Default)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`. With no hash
  /// configured every admin request is refused.
  pub password_hash: Option<String>,
}

/// Zero-size marker: present in the handler means the request was authenticated.
pub struct Authenticated;

/// Check the `Authorization: Basic` header in `headers` against the operator
/// credentials. A server with no hash configured refuses every caller, so the
/// settle webhook stays closed until an operator sets one.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), ApiError> {
  let stored_hash = config.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;

  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  if username != config.username {
    return Err(ApiError::Unauthorized);
  }

  let parsed_hash = PasswordHash::new(stored_hash).map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(())
}

impl<L> FromRequestParts<AppState<L>> for Authenticated
where
  L: ReferralLedger + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<L>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth)?;
    Ok(Authenticated)
  }
}
