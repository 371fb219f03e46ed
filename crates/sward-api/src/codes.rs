//! Handlers for referral codes.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/codes` | Body: `{"referrer":"...","expiration_days":30}` |
//! | `GET`  | `/codes/:code` | 404 if never issued |
//! | `POST` | `/codes/:code/deactivate` | Admin; soft deactivation |
//! | `POST` | `/referral/validate` | Body: `{"code":"...","referee":"..."}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sward_core::{
  ledger::ReferralLedger,
  referral::ReferralCode,
  validation::CodeCheck,
};

use crate::{AppState, auth::Authenticated, error::ApiError, require_identity};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub referrer:        String,
  /// Overrides the server's default code lifetime.
  pub expiration_days: Option<u32>,
}

/// `POST /codes`: returns 201 + the issued [`ReferralCode`].
pub async fn create<L>(
  State(state): State<AppState<L>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: ReferralLedger,
{
  let referrer = require_identity("referrer", &body.referrer)?;
  let expiration_days = body.expiration_days.or(state.policy.code_expiration_days);

  let code = state
    .ledger
    .create_code(referrer, expiration_days)
    .await
    .map_err(ApiError::ledger)?;
  Ok((StatusCode::CREATED, Json(code)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /codes/:code`
pub async fn get_one<L>(
  State(state): State<AppState<L>>,
  Path(code): Path<String>,
) -> Result<Json<ReferralCode>, ApiError>
where
  L: ReferralLedger,
{
  let found = state
    .ledger
    .get_code(code.clone())
    .await
    .map_err(ApiError::ledger)?
    .ok_or_else(|| ApiError::NotFound(format!("referral code {code} not found")))?;
  Ok(Json(found))
}

// ─── Deactivate ──────────────────────────────────────────────────────────────

/// `POST /codes/:code/deactivate`
pub async fn deactivate<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Path(code): Path<String>,
) -> Result<Json<ReferralCode>, ApiError>
where
  L: ReferralLedger + 'static,
{
  let code = state
    .ledger
    .deactivate_code(code)
    .await
    .map_err(ApiError::ledger)?;
  Ok(Json(code))
}

// ─── Validate ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
  pub code:    String,
  #[serde(alias = "referee_email")]
  pub referee: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
  pub valid:            bool,
  pub referrer:         String,
  pub discount_percent: u8,
}

/// `POST /referral/validate`: 200 with the referrer and discount when the
/// referee may use the code, 422 with a reason code otherwise. Records
/// nothing.
pub async fn validate<L>(
  State(state): State<AppState<L>>,
  Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, ApiError>
where
  L: ReferralLedger,
{
  let referee = require_identity("referee", &body.referee)?;

  let check = state
    .ledger
    .validate_code(body.code, referee)
    .await
    .map_err(ApiError::ledger)?;

  match check {
    CodeCheck::Eligible { referrer } => Ok(Json(ValidateResponse {
      valid: true,
      referrer,
      discount_percent: state.policy.referee_discount_percent,
    })),
    CodeCheck::Rejected { reason } => {
      Err(ApiError::Rejected(reason, StatusCode::UNPROCESSABLE_ENTITY))
    }
  }
}
