//! JSON REST API for the Sward referral ledger.
//!
//! Exposes an axum [`Router`] backed by any
//! [`sward_core::ledger::ReferralLedger`]. TLS, CORS and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", sward_api::api_router(state))
//! ```

pub mod auth;
pub mod codes;
pub mod customers;
pub mod error;
pub mod rewards;
pub mod uses;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use sward_core::{
  ledger::ReferralLedger,
  referral::{Amount, DEFAULT_REWARD_VALIDITY_DAYS},
};

pub use auth::AuthConfig;
pub use error::ApiError;

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Business knobs applied by the HTTP layer on top of the ledger.
#[derive(Debug, Clone)]
pub struct ReferralPolicy {
  /// When off, every route answers 404.
  pub enabled:                  bool,
  /// Discount offered to a referee holding a valid code, in percent.
  pub referee_discount_percent: u8,
  /// What a referrer earns per completed referral unless the caller says
  /// otherwise.
  pub reward_amount:            Amount,
  pub reward_validity_days:     u32,
  /// Lifetime of newly issued codes; `None` issues non-expiring codes.
  pub code_expiration_days:     Option<u32>,
}

impl Default for ReferralPolicy {
  fn default() -> Self {
    Self {
      enabled:                  true,
      referee_discount_percent: 15,
      reward_amount:            Amount::from_cents(2000),
      reward_validity_days:     DEFAULT_REWARD_VALIDITY_DAYS,
      code_expiration_days:     None,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<L> {
  pub ledger: Arc<L>,
  pub policy: Arc<ReferralPolicy>,
  pub auth:   Arc<AuthConfig>,
}

impl<L> Clone for AppState<L> {
  fn clone(&self) -> Self {
    Self {
      ledger: self.ledger.clone(),
      policy: self.policy.clone(),
      auth:   self.auth.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<L>(state: AppState<L>) -> Router<()>
where
  L: ReferralLedger + 'static,
{
  if !state.policy.enabled {
    return Router::new().fallback(|| async { ApiError::Disabled });
  }

  Router::new()
    // Customers
    .route("/customers", post(customers::create::<L>))
    // Codes
    .route("/codes", post(codes::create::<L>))
    .route("/codes/{code}", get(codes::get_one::<L>))
    .route("/codes/{code}/deactivate", post(codes::deactivate::<L>))
    .route("/referral/validate", post(codes::validate::<L>))
    // Uses
    .route("/uses", get(uses::find_by_order::<L>).post(uses::record::<L>))
    .route("/uses/{id}/status", post(uses::update_status::<L>))
    .route("/uses/{id}/settle", post(uses::settle::<L>))
    // Rewards
    .route("/rewards", post(rewards::create::<L>))
    .route("/rewards/{identity}", get(rewards::active::<L>))
    .route("/rewards/{identity}/history", get(rewards::history::<L>))
    .route("/statistics/{identity}", get(rewards::statistics::<L>))
    .with_state(state)
}

/// Trim an identity and refuse blanks.
pub(crate) fn require_identity(field: &str, value: &str) -> Result<String, ApiError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ApiError::BadRequest(format!("{field} must not be empty")));
  }
  Ok(trimmed.to_owned())
}
