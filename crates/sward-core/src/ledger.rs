//! The `ReferralLedger` trait.
//!
//! The trait is implemented by storage backends (e.g. `sward-store-sqlite`).
//! Higher layers (`sward-api`, `sward-server`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use crate::{
  Classify,
  referral::{
    Amount, Customer, NewReward, ReferralCode, ReferralReward,
    ReferralStatistics, ReferralUse, Settlement, UseStatus,
  },
  validation::CodeCheck,
};

/// Sole authority over referral codes, their redemption, and rewards.
///
/// Every method runs against the backing store directly; implementations keep
/// no state across calls. No method holds a lock or transaction open after it
/// returns, so `validate_code` followed by `record_use` is not atomic. The
/// store's uniqueness constraint on referees is the authoritative guard:
/// callers must treat a `record_use` conflict as "already referred" even if
/// validation passed.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ReferralLedger: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Customers ─────────────────────────────────────────────────────────

  /// Add `identity` to the customer identity store. Idempotent.
  fn register_customer(
    &self,
    identity: String,
  ) -> impl Future<Output = Result<Customer, Self::Error>> + Send + '_;

  // ── Codes ─────────────────────────────────────────────────────────────

  /// Issue a fresh code for `referrer`. With `expiration_days` the code
  /// expires that many days from now (`Some(0)` expires immediately);
  /// without it the code never expires.
  fn create_code(
    &self,
    referrer: String,
    expiration_days: Option<u32>,
  ) -> impl Future<Output = Result<ReferralCode, Self::Error>> + Send + '_;

  /// Look up a code. Returns `None` if it was never issued.
  fn get_code(
    &self,
    code: String,
  ) -> impl Future<Output = Result<Option<ReferralCode>, Self::Error>> + Send + '_;

  /// Soft-deactivate a code. Codes are never deleted.
  fn deactivate_code(
    &self,
    code: String,
  ) -> impl Future<Output = Result<ReferralCode, Self::Error>> + Send + '_;

  // ── Redemption ────────────────────────────────────────────────────────

  /// Decide whether `referee` may redeem `code`. Pure read.
  fn validate_code(
    &self,
    code: String,
    referee: String,
  ) -> impl Future<Output = Result<CodeCheck, Self::Error>> + Send + '_;

  /// Record a redemption and bump the code's usage count in one
  /// transaction. Does not re-validate.
  fn record_use(
    &self,
    code: String,
    referee: String,
    order_id: String,
    reward_amount: Amount,
  ) -> impl Future<Output = Result<ReferralUse, Self::Error>> + Send + '_;

  /// Find the use tied to an order, if any.
  fn find_use_by_order(
    &self,
    order_id: String,
  ) -> impl Future<Output = Result<Option<ReferralUse>, Self::Error>> + Send + '_;

  /// Change a use's reward status. Only `PENDING → COMPLETED` is allowed.
  fn update_use_status(
    &self,
    use_id: i64,
    status: UseStatus,
  ) -> impl Future<Output = Result<ReferralUse, Self::Error>> + Send + '_;

  // ── Rewards ───────────────────────────────────────────────────────────

  /// Insert an active reward. Does not touch the use's status; prefer
  /// [`ReferralLedger::settle_reward`].
  fn create_reward(
    &self,
    input: NewReward,
  ) -> impl Future<Output = Result<ReferralReward, Self::Error>> + Send + '_;

  /// Issue the referrer's reward for a use and mark the use completed, both
  /// or neither.
  fn settle_reward(
    &self,
    use_id: i64,
    settlement: Settlement,
  ) -> impl Future<Output = Result<ReferralReward, Self::Error>> + Send + '_;

  /// Rewards that are active and unexpired right now, oldest first.
  fn get_active_rewards(
    &self,
    recipient: String,
  ) -> impl Future<Output = Result<Vec<ReferralReward>, Self::Error>> + Send + '_;

  /// Every reward ever issued to `recipient`, expired or not, oldest first.
  fn list_rewards(
    &self,
    recipient: String,
  ) -> impl Future<Output = Result<Vec<ReferralReward>, Self::Error>> + Send + '_;

  // ── Reporting ─────────────────────────────────────────────────────────

  fn get_statistics(
    &self,
    identity: String,
  ) -> impl Future<Output = Result<ReferralStatistics, Self::Error>> + Send + '_;
}
