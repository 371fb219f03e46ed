//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as Unix epoch seconds, amounts as integer cents and
//! statuses as their uppercase names.

use chrono::{DateTime, Utc};
use sward_core::referral::{
  Amount, CodeSummary, Customer, ReferralCode, ReferralReward,
  ReferralStatistics, ReferralUse,
};

use crate::{Error, Result};

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_ts(dt: DateTime<Utc>) -> i64 { dt.timestamp() }

pub fn decode_ts(secs: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp(secs, 0)
    .ok_or_else(|| Error::Decode(format!("timestamp out of range: {secs}")))
}

// ─── Counters ────────────────────────────────────────────────────────────────

fn decode_u32(field: &str, v: i64) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("{field} out of range: {v}")))
}

fn decode_u64(field: &str, v: i64) -> Result<u64> {
  u64::try_from(v).map_err(|_| Error::Decode(format!("{field} out of range: {v}")))
}

// ─── Unique-constraint detection ─────────────────────────────────────────────

/// Whether `e` is a UNIQUE or PRIMARY KEY violation.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

// ─── Customers ───────────────────────────────────────────────────────────────

pub struct RawCustomer {
  pub identity:   String,
  pub created_at: i64,
}

impl RawCustomer {
  pub fn into_customer(self) -> Result<Customer> {
    Ok(Customer {
      identity:   self.identity,
      created_at: decode_ts(self.created_at)?,
    })
  }
}

// ─── Codes ───────────────────────────────────────────────────────────────────

pub const CODE_COLUMNS: &str =
  "code, referrer, created_at, expires_at, usage_count, is_active";

/// Raw values read from a `referral_codes` row.
pub struct RawCode {
  pub code:        String,
  pub referrer:    String,
  pub created_at:  i64,
  pub expires_at:  Option<i64>,
  pub usage_count: i64,
  pub is_active:   bool,
}

impl RawCode {
  /// Read a row selected with [`CODE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      code:        row.get(0)?,
      referrer:    row.get(1)?,
      created_at:  row.get(2)?,
      expires_at:  row.get(3)?,
      usage_count: row.get(4)?,
      is_active:   row.get(5)?,
    })
  }

  pub fn into_code(self) -> Result<ReferralCode> {
    Ok(ReferralCode {
      code:        self.code,
      referrer:    self.referrer,
      created_at:  decode_ts(self.created_at)?,
      expires_at:  self.expires_at.map(decode_ts).transpose()?,
      usage_count: decode_u32("usage_count", self.usage_count)?,
      is_active:   self.is_active,
    })
  }

  pub fn into_summary(self) -> Result<CodeSummary> {
    let code = self.into_code()?;
    Ok(CodeSummary {
      code:        code.code,
      created_at:  code.created_at,
      expires_at:  code.expires_at,
      usage_count: code.usage_count,
    })
  }
}

// ─── Uses ────────────────────────────────────────────────────────────────────

pub const USE_COLUMNS: &str =
  "id, referral_code, referee, used_at, order_id, reward_status, reward_amount";

/// Raw values read from a `referral_uses` row.
pub struct RawUse {
  pub id:            i64,
  pub referral_code: String,
  pub referee:       String,
  pub used_at:       i64,
  pub order_id:      String,
  pub reward_status: String,
  pub reward_amount: i64,
}

impl RawUse {
  /// Read a row selected with [`USE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      referral_code: row.get(1)?,
      referee:       row.get(2)?,
      used_at:       row.get(3)?,
      order_id:      row.get(4)?,
      reward_status: row.get(5)?,
      reward_amount: row.get(6)?,
    })
  }

  pub fn into_use(self) -> Result<ReferralUse> {
    Ok(ReferralUse {
      id:            self.id,
      referral_code: self.referral_code,
      referee:       self.referee,
      used_at:       decode_ts(self.used_at)?,
      order_id:      self.order_id,
      reward_status: self.reward_status.parse()?,
      reward_amount: Amount::from_cents(self.reward_amount),
    })
  }
}

// ─── Rewards ─────────────────────────────────────────────────────────────────

pub const REWARD_COLUMNS: &str = "id, recipient, amount, created_at, expires_at, \
                                  status, referral_use_id, external_credit_ref";

/// Raw values of a `referral_rewards` row. Also used to insert one, with
/// `id` filled in afterwards.
pub struct RawReward {
  pub id:                  i64,
  pub recipient:           String,
  pub amount:              i64,
  pub created_at:          i64,
  pub expires_at:          i64,
  pub status:              String,
  pub referral_use_id:     Option<i64>,
  pub external_credit_ref: Option<String>,
}

impl RawReward {
  /// Read a row selected with [`REWARD_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      recipient:           row.get(1)?,
      amount:              row.get(2)?,
      created_at:          row.get(3)?,
      expires_at:          row.get(4)?,
      status:              row.get(5)?,
      referral_use_id:     row.get(6)?,
      external_credit_ref: row.get(7)?,
    })
  }

  /// Insert as a new row and record the assigned id.
  pub fn insert(&mut self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
      "INSERT INTO referral_rewards (
         recipient, amount, created_at, expires_at, status,
         referral_use_id, external_credit_ref
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      rusqlite::params![
        self.recipient,
        self.amount,
        self.created_at,
        self.expires_at,
        self.status,
        self.referral_use_id,
        self.external_credit_ref,
      ],
    )?;
    self.id = conn.last_insert_rowid();
    Ok(())
  }

  pub fn into_reward(self) -> Result<ReferralReward> {
    Ok(ReferralReward {
      id:                  self.id,
      recipient:           self.recipient,
      amount:              Amount::from_cents(self.amount),
      created_at:          decode_ts(self.created_at)?,
      expires_at:          decode_ts(self.expires_at)?,
      status:              self.status.parse()?,
      referral_use_id:     self.referral_use_id,
      external_credit_ref: self.external_credit_ref,
    })
  }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Raw aggregates collected for [`ReferralStatistics`].
pub struct RawStatistics {
  pub total_referrals: i64,
  pub total_earnings:  i64,
  pub pending_rewards: i64,
  pub active_balance:  i64,
  pub active_codes:    Vec<RawCode>,
}

impl RawStatistics {
  pub fn into_statistics(self) -> Result<ReferralStatistics> {
    Ok(ReferralStatistics {
      total_referrals:       decode_u64("total_referrals", self.total_referrals)?,
      total_earnings:        Amount::from_cents(self.total_earnings),
      pending_rewards:       decode_u64("pending_rewards", self.pending_rewards)?,
      active_reward_balance: Amount::from_cents(self.active_balance),
      active_codes:          self
        .active_codes
        .into_iter()
        .map(RawCode::into_summary)
        .collect::<Result<_>>()?,
    })
  }
}
