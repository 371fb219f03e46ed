//! Handlers for referral uses (redemptions).
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/uses` | Body: [`RecordBody`]; 409 + `ALREADY_REFERRED` on a repeat referee |
//! | `GET`  | `/uses` | Admin; `?order_id=` required |
//! | `POST` | `/uses/:id/status` | Admin; body: `{"status":"COMPLETED"}` |
//! | `POST` | `/uses/:id/settle` | Admin; body: [`SettleBody`]; issues the reward |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use sward_core::{
  ledger::ReferralLedger,
  referral::{Amount, ReferralUse, Settlement, UseStatus},
};

use crate::{AppState, auth::Authenticated, error::ApiError, require_identity};

/// Refuse negative money.
pub(crate) fn parse_amount(field: &str, cents: i64) -> Result<Amount, ApiError> {
  let amount = Amount::from_cents(cents);
  if amount.is_negative() {
    return Err(ApiError::BadRequest(format!("{field} must not be negative")));
  }
  Ok(amount)
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  pub code:                String,
  pub referee:             String,
  /// The payment-processor object the redemption is tied to.
  pub order_id:            String,
  /// Defaults to the server's configured reward.
  pub reward_amount_cents: Option<i64>,
}

/// `POST /uses`: returns 201 + the recorded [`ReferralUse`].
pub async fn record<L>(
  State(state): State<AppState<L>>,
  Json(body): Json<RecordBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: ReferralLedger,
{
  let referee  = require_identity("referee", &body.referee)?;
  let order_id = require_identity("order_id", &body.order_id)?;
  let amount   = match body.reward_amount_cents {
    Some(cents) => parse_amount("reward_amount_cents", cents)?,
    None => state.policy.reward_amount,
  };

  let referral_use = state
    .ledger
    .record_use(body.code, referee, order_id, amount)
    .await
    .map_err(ApiError::ledger)?;
  Ok((StatusCode::CREATED, Json(referral_use)))
}

// ─── Find by order ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FindParams {
  pub order_id: String,
}

/// `GET /uses?order_id=<id>`
pub async fn find_by_order<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Query(params): Query<FindParams>,
) -> Result<Json<ReferralUse>, ApiError>
where
  L: ReferralLedger + 'static,
{
  let order_id = params.order_id;
  let found = state
    .ledger
    .find_use_by_order(order_id.clone())
    .await
    .map_err(ApiError::ledger)?
    .ok_or_else(|| ApiError::NotFound(format!("no referral use for order {order_id}")))?;
  Ok(Json(found))
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: UseStatus,
}

/// `POST /uses/:id/status`
pub async fn update_status<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Path(id): Path<i64>,
  Json(body): Json<StatusBody>,
) -> Result<Json<ReferralUse>, ApiError>
where
  L: ReferralLedger + 'static,
{
  let updated = state
    .ledger
    .update_use_status(id, body.status)
    .await
    .map_err(ApiError::ledger)?;
  Ok(Json(updated))
}

// ─── Settle ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /uses/:id/settle`. All fields optional.
#[derive(Debug, Default, Deserialize)]
pub struct SettleBody {
  /// Overrides the amount promised when the use was recorded.
  pub amount_cents:        Option<i64>,
  pub external_credit_ref: Option<String>,
  pub validity_days:       Option<u32>,
}

/// `POST /uses/:id/settle`: returns 201 + the issued reward. Called once the
/// referee's payment has succeeded.
pub async fn settle<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Path(id): Path<i64>,
  Json(body): Json<SettleBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: ReferralLedger + 'static,
{
  let settlement = Settlement {
    amount:              body
      .amount_cents
      .map(|c| parse_amount("amount_cents", c))
      .transpose()?,
    external_credit_ref: body.external_credit_ref,
    validity_days:       body.validity_days.unwrap_or(state.policy.reward_validity_days),
  };

  let reward = state
    .ledger
    .settle_reward(id, settlement)
    .await
    .map_err(ApiError::ledger)?;
  Ok((StatusCode::CREATED, Json(reward)))
}
