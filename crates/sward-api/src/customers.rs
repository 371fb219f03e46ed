//! Handler for `POST /customers`.
//!
//! The customer store only matters when the server requires referrers to be
//! known before they can be issued a code.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use sward_core::ledger::ReferralLedger;

use crate::{AppState, error::ApiError, require_identity};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub identity: String,
}

/// `POST /customers`: body `{"identity":"alice@example.com"}`. Idempotent.
pub async fn create<L>(
  State(state): State<AppState<L>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: ReferralLedger,
{
  let identity = require_identity("identity", &body.identity)?;
  let customer = state
    .ledger
    .register_customer(identity)
    .await
    .map_err(ApiError::ledger)?;
  Ok((StatusCode::CREATED, Json(customer)))
}
