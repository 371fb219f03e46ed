//! Referral codes, their uses, and the rewards they generate.
//!
//! A [`ReferralCode`] belongs to a referrer. Each time a new customer (the
//! referee) redeems it, a [`ReferralUse`] is recorded; once the referee's
//! order is paid, the use is settled and a [`ReferralReward`] is issued to the
//! referrer.

use std::{fmt, iter::Sum, ops::Add, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, validation::Rejection};

/// How long a reward stays spendable unless the caller says otherwise.
pub const DEFAULT_REWARD_VALIDITY_DAYS: u32 = 180;

/// Longest lifetime, in days, accepted for a code or a reward.
pub const MAX_LIFETIME_DAYS: u32 = 36_500;

// ─── Amount ──────────────────────────────────────────────────────────────────

/// A monetary amount in minor currency units (cents).
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
  pub const ZERO: Self = Self(0);

  pub const fn from_cents(cents: i64) -> Self { Self(cents) }

  pub const fn cents(self) -> i64 { self.0 }

  pub const fn is_negative(self) -> bool { self.0 < 0 }
}

impl Add for Amount {
  type Output = Self;

  fn add(self, rhs: Self) -> Self { Self(self.0 + rhs.0) }
}

impl Sum for Amount {
  fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
    iter.fold(Self::ZERO, Add::add)
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
  }
}

// ─── Customer ────────────────────────────────────────────────────────────────

/// An entry in the customer identity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
  pub identity:   String,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub created_at: DateTime<Utc>,
}

// ─── Codes ───────────────────────────────────────────────────────────────────

/// A referral code. The `code` string never changes once issued; codes are
/// deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCode {
  pub code:        String,
  pub referrer:    String,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub created_at:  DateTime<Utc>,
  /// `None` means the code never expires.
  #[serde(with = "chrono::serde::ts_seconds_option")]
  pub expires_at:  Option<DateTime<Utc>>,
  pub usage_count: u32,
  pub is_active:   bool,
}

impl ReferralCode {
  /// Expired strictly after `expires_at`, at second resolution.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self
      .expires_at
      .is_some_and(|exp| now.timestamp() > exp.timestamp())
  }

  /// The checks that depend only on the code row itself. The one-use-per-
  /// referee rule needs the whole ledger and is applied by the store.
  pub fn check_redeemable(
    &self,
    referee: &str,
    now: DateTime<Utc>,
  ) -> Result<(), Rejection> {
    if !self.is_active {
      return Err(Rejection::CodeInactive);
    }
    if self.is_expired(now) {
      return Err(Rejection::CodeExpired);
    }
    if self.referrer == referee {
      return Err(Rejection::SelfReferral);
    }
    Ok(())
  }
}

/// `now` moved forward by `days`, refusing lifetimes over
/// [`MAX_LIFETIME_DAYS`].
fn add_days(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, Error> {
  if days > MAX_LIFETIME_DAYS {
    return Err(Error::InvalidLifetime(days));
  }
  Duration::try_days(i64::from(days))
    .and_then(|d| now.checked_add_signed(d))
    .ok_or(Error::InvalidLifetime(days))
}

/// Expiry for a code issued at `now` that lives `days` days.
pub fn code_expiry(
  now: DateTime<Utc>,
  days: Option<u32>,
) -> Result<Option<DateTime<Utc>>, Error> {
  days.map(|d| add_days(now, d)).transpose()
}

// ─── Uses ────────────────────────────────────────────────────────────────────

/// Settlement state of a referral use's reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UseStatus {
  Pending,
  Completed,
}

impl UseStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Completed => "COMPLETED",
    }
  }

  /// Check a requested status change. Only `Pending → Completed` moves
  /// anything; asking for the current `Pending` state again is a no-op.
  pub fn transition(self, to: Self, use_id: i64) -> Result<Self, Error> {
    match (self, to) {
      (Self::Pending, Self::Completed) | (Self::Pending, Self::Pending) => Ok(to),
      (Self::Completed, Self::Completed) => Err(Error::AlreadySettled(use_id)),
      (from, to) => Err(Error::InvalidTransition { from, to }),
    }
  }
}

impl fmt::Display for UseStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for UseStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "PENDING" => Ok(Self::Pending),
      "COMPLETED" => Ok(Self::Completed),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// A single redemption of a referral code by a referee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralUse {
  pub id:            i64,
  pub referral_code: String,
  pub referee:       String,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub used_at:       DateTime<Utc>,
  /// The commercial transaction this redemption belongs to, e.g. a
  /// payment-intent id.
  pub order_id:      String,
  pub reward_status: UseStatus,
  /// What the referrer is owed once the order settles.
  pub reward_amount: Amount,
}

// ─── Rewards ─────────────────────────────────────────────────────────────────

/// Stored status of a reward. Expiry is not stored; see
/// [`ReferralReward::is_expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
  Active,
}

impl RewardStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "ACTIVE",
    }
  }
}

impl FromStr for RewardStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "ACTIVE" => Ok(Self::Active),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// A credit owed to a referrer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralReward {
  pub id:                  i64,
  pub recipient:           String,
  pub amount:              Amount,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub created_at:          DateTime<Utc>,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub expires_at:          DateTime<Utc>,
  pub status:              RewardStatus,
  /// The use that earned this reward. Lookup only; the reward does not own
  /// the use.
  pub referral_use_id:     Option<i64>,
  /// Id of the external ledger entry that delivers the credit, such as a
  /// processor-side balance transaction.
  pub external_credit_ref: Option<String>,
}

impl ReferralReward {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.timestamp() <= now.timestamp()
  }

  /// Spendable right now.
  pub fn is_active(&self, now: DateTime<Utc>) -> bool {
    self.status == RewardStatus::Active && !self.is_expired(now)
  }
}

/// Input to [`crate::ledger::ReferralLedger::create_reward`].
#[derive(Debug, Clone)]
pub struct NewReward {
  pub recipient:           String,
  pub amount:              Amount,
  pub referral_use_id:     i64,
  pub external_credit_ref: Option<String>,
  pub validity_days:       u32,
}

impl NewReward {
  /// A reward with the default validity and no external credit reference.
  pub fn new(recipient: impl Into<String>, amount: Amount, referral_use_id: i64) -> Self {
    Self {
      recipient: recipient.into(),
      amount,
      referral_use_id,
      external_credit_ref: None,
      validity_days: DEFAULT_REWARD_VALIDITY_DAYS,
    }
  }
}

/// Input to [`crate::ledger::ReferralLedger::settle_reward`].
#[derive(Debug, Clone)]
pub struct Settlement {
  /// Overrides the use's own `reward_amount` when set.
  pub amount:              Option<Amount>,
  pub external_credit_ref: Option<String>,
  pub validity_days:       u32,
}

impl Default for Settlement {
  fn default() -> Self {
    Self {
      amount:              None,
      external_credit_ref: None,
      validity_days:       DEFAULT_REWARD_VALIDITY_DAYS,
    }
  }
}

/// Expiry for a reward created at `now`.
pub fn reward_expiry(now: DateTime<Utc>, validity_days: u32) -> Result<DateTime<Utc>, Error> {
  add_days(now, validity_days)
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// One of a referrer's active codes, as reported in [`ReferralStatistics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSummary {
  pub code:        String,
  #[serde(with = "chrono::serde::ts_seconds")]
  pub created_at:  DateTime<Utc>,
  #[serde(with = "chrono::serde::ts_seconds_option")]
  pub expires_at:  Option<DateTime<Utc>>,
  pub usage_count: u32,
}

/// Aggregates over everything a referrer's codes have produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralStatistics {
  pub total_referrals:       u64,
  /// Sum of `reward_amount` over all uses of the referrer's codes, settled
  /// or not.
  pub total_earnings:        Amount,
  /// Uses still waiting for their order to settle.
  pub pending_rewards:       u64,
  /// Sum of the referrer's unexpired, active rewards.
  pub active_reward_balance: Amount,
  pub active_codes:          Vec<CodeSummary>,
}
