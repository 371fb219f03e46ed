//! Handlers for rewards and per-referrer statistics.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use sward_core::{
  ledger::ReferralLedger,
  referral::{NewReward, ReferralReward, ReferralStatistics},
};

use crate::{
  AppState, auth::Authenticated, error::ApiError, require_identity,
  uses::parse_amount,
};

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub recipient:           String,
  pub amount_cents:        i64,
  pub referral_use_id:     i64,
  pub external_credit_ref: Option<String>,
  pub validity_days:       Option<u32>,
}

/// `POST /rewards`: issue a reward for a use directly, without touching the
/// use's status. Prefer `/uses/:id/settle`.
pub async fn create<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  L: ReferralLedger + 'static,
{
  let recipient = require_identity("recipient", &body.recipient)?;
  let amount = parse_amount("amount_cents", body.amount_cents)?;

  let mut new = NewReward::new(recipient, amount, body.referral_use_id);
  new.external_credit_ref = body.external_credit_ref;
  new.validity_days = body.validity_days.unwrap_or(state.policy.reward_validity_days);

  let reward = state
    .ledger
    .create_reward(new)
    .await
    .map_err(ApiError::ledger)?;
  Ok((StatusCode::CREATED, Json(reward)))
}

/// `GET /rewards/:identity`: rewards the identity can still spend.
pub async fn active<L>(
  State(state): State<AppState<L>>,
  Path(identity): Path<String>,
) -> Result<Json<Vec<ReferralReward>>, ApiError>
where
  L: ReferralLedger,
{
  let rewards = state
    .ledger
    .get_active_rewards(identity)
    .await
    .map_err(ApiError::ledger)?;
  Ok(Json(rewards))
}

/// `GET /rewards/:identity/history`: every reward, expired ones included.
pub async fn history<L>(
  _auth: Authenticated,
  State(state): State<AppState<L>>,
  Path(identity): Path<String>,
) -> Result<Json<Vec<ReferralReward>>, ApiError>
where
  L: ReferralLedger + 'static,
{
  let rewards = state
    .ledger
    .list_rewards(identity)
    .await
    .map_err(ApiError::ledger)?;
  Ok(Json(rewards))
}

/// `GET /statistics/:identity`
pub async fn statistics<L>(
  State(state): State<AppState<L>>,
  Path(identity): Path<String>,
) -> Result<Json<ReferralStatistics>, ApiError>
where
  L: ReferralLedger,
{
  let stats = state
    .ledger
    .get_statistics(identity)
    .await
    .map_err(ApiError::ledger)?;
  Ok(Json(stats))
}
