//! [`SqliteLedger`], the SQLite implementation of [`ReferralLedger`].

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::{debug, info, warn};

use sward_core::{
  Error as LedgerError,
  clock::{Clock, SystemClock},
  code::{CodeSource, attempt_lengths, normalize_code, os_code_source},
  ledger::ReferralLedger,
  referral::{
    Amount, Customer, NewReward, ReferralCode, ReferralReward,
    ReferralStatistics, ReferralUse, RewardStatus, Settlement, UseStatus,
    code_expiry, reward_expiry,
  },
  validation::{CodeCheck, Rejection},
};

use crate::{
  Result,
  encode::{
    CODE_COLUMNS, REWARD_COLUMNS, RawCode, RawCustomer, RawReward,
    RawStatistics, RawUse, USE_COLUMNS, decode_ts, encode_ts,
    is_unique_violation,
  },
  schema::SCHEMA,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Everything needed to open a ledger. Passed explicitly; the ledger reads no
/// ambient state.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
  pub store_path:             PathBuf,
  /// Refuse to issue codes to identities missing from the customer store.
  pub require_known_referrer: bool,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A referral ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteLedger {
  conn:                   tokio_rusqlite::Connection,
  clock:                  Arc<dyn Clock>,
  code_source:            CodeSource,
  require_known_referrer: bool,
}

impl SqliteLedger {
  /// Open (or create) a ledger at `config.store_path` and run schema
  /// initialisation.
  pub async fn open(config: &LedgerConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(&config.store_path).await?;
    Self::init(conn, config.require_known_referrer).await
  }

  /// Open an in-memory ledger, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, false).await
  }

  /// Replace the wall clock, e.g. with a
  /// [`ManualClock`](sward_core::clock::ManualClock) in tests.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  /// Replace the token generator, e.g. to force collisions in tests.
  pub fn with_code_source(mut self, source: CodeSource) -> Self {
    self.code_source = source;
    self
  }

  pub fn with_referrer_check(mut self, required: bool) -> Self {
    self.require_known_referrer = required;
    self
  }

  async fn init(conn: tokio_rusqlite::Connection, require_known_referrer: bool) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      clock: Arc::new(SystemClock),
      code_source: os_code_source(),
      require_known_referrer,
    })
  }

  fn now(&self) -> DateTime<Utc> { self.clock.now() }
}

// ─── ReferralLedger impl ─────────────────────────────────────────────────────

impl ReferralLedger for SqliteLedger {
  type Error = crate::Error;

  // ── Customers ─────────────────────────────────────────────────────────────

  async fn register_customer(&self, identity: String) -> Result<Customer> {
    let at = encode_ts(self.now());

    let raw: RawCustomer = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO customers (identity, created_at) VALUES (?1, ?2)",
          rusqlite::params![identity, at],
        )?;
        Ok(conn.query_row(
          "SELECT identity, created_at FROM customers WHERE identity = ?1",
          rusqlite::params![identity],
          |row| {
            Ok(RawCustomer {
              identity:   row.get(0)?,
              created_at: row.get(1)?,
            })
          },
        )?)
      })
      .await?;

    raw.into_customer()
  }

  // ── Codes ─────────────────────────────────────────────────────────────────

  async fn create_code(
    &self,
    referrer: String,
    expiration_days: Option<u32>,
  ) -> Result<ReferralCode> {
    let now          = self.now();
    let expires_at   = code_expiry(now, expiration_days)?;
    let created_secs = encode_ts(now);
    let expires_secs = expires_at.map(encode_ts);
    let check_known  = self.require_known_referrer;
    let source       = self.code_source.clone();
    let referrer_arg = referrer.clone();

    let issued: Result<String, LedgerError> = self
      .conn
      .call(move |conn| {
        if check_known {
          let known = conn
            .query_row(
              "SELECT 1 FROM customers WHERE identity = ?1",
              rusqlite::params![referrer_arg],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !known {
            return Ok(Err(LedgerError::UnknownReferrer(referrer_arg)));
          }
        }

        // The primary key is the collision check: insert and draw again on
        // conflict.
        for len in attempt_lengths() {
          let code = source(len);
          match conn.execute(
            "INSERT INTO referral_codes (code, referrer, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![code, referrer_arg, created_secs, expires_secs],
          ) {
            Ok(_) => return Ok(Ok(code)),
            Err(e) if is_unique_violation(&e) => {
              debug!(%code, "referral code collision, retrying");
            }
            Err(e) => return Err(e.into()),
          }
        }
        Ok(Err(LedgerError::CodeSpaceExhausted))
      })
      .await?;

    let code = match issued {
      Ok(code) => code,
      Err(e) => {
        warn!(%referrer, error = %e, "could not issue referral code");
        return Err(e.into());
      }
    };

    info!(%code, %referrer, "issued referral code");
    Ok(ReferralCode {
      code,
      referrer,
      created_at: decode_ts(created_secs)?,
      expires_at,
      usage_count: 0,
      is_active: true,
    })
  }

  async fn get_code(&self, code: String) -> Result<Option<ReferralCode>> {
    let code = normalize_code(&code);

    let raw: Option<RawCode> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CODE_COLUMNS} FROM referral_codes WHERE code = ?1"),
            rusqlite::params![code],
            RawCode::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCode::into_code).transpose()
  }

  async fn deactivate_code(&self, code: String) -> Result<ReferralCode> {
    let code = normalize_code(&code);
    let code_arg = code.clone();

    let raw: Option<RawCode> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE referral_codes SET is_active = 0 WHERE code = ?1",
          rusqlite::params![code_arg],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(Some(conn.query_row(
          &format!("SELECT {CODE_COLUMNS} FROM referral_codes WHERE code = ?1"),
          rusqlite::params![code_arg],
          RawCode::from_row,
        )?))
      })
      .await?;

    let raw = raw.ok_or_else(|| LedgerError::CodeNotFound(code.clone()))?;
    info!(%code, "deactivated referral code");
    raw.into_code()
  }

  // ── Redemption ────────────────────────────────────────────────────────────

  async fn validate_code(&self, code: String, referee: String) -> Result<CodeCheck> {
    let now          = self.now();
    let code         = normalize_code(&code);
    let referee_arg  = referee.clone();

    let found: Option<(RawCode, bool)> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!("SELECT {CODE_COLUMNS} FROM referral_codes WHERE code = ?1"),
            rusqlite::params![code],
            RawCode::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(None);
        };

        let referred = conn
          .query_row(
            "SELECT 1 FROM referral_uses WHERE referee = ?1",
            rusqlite::params![referee_arg],
            |_| Ok(()),
          )
          .optional()?
          .is_some();

        Ok(Some((raw, referred)))
      })
      .await?;

    let Some((raw, referred)) = found else {
      return Ok(Rejection::InvalidCode.into());
    };
    let code = raw.into_code()?;

    if let Err(rejection) = code.check_redeemable(&referee, now) {
      return Ok(rejection.into());
    }
    if referred {
      return Ok(Rejection::AlreadyReferred.into());
    }
    Ok(CodeCheck::Eligible { referrer: code.referrer })
  }

  async fn record_use(
    &self,
    code: String,
    referee: String,
    order_id: String,
    reward_amount: Amount,
  ) -> Result<ReferralUse> {
    let now          = self.now();
    let used_at      = encode_ts(now);
    let code         = normalize_code(&code);
    let code_arg     = code.clone();
    let referee_arg  = referee.clone();
    let order_arg    = order_id.clone();
    let amount_cents = reward_amount.cents();

    let recorded: Result<i64, LedgerError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let bumped = tx.execute(
          "UPDATE referral_codes SET usage_count = usage_count + 1 WHERE code = ?1",
          rusqlite::params![code_arg],
        )?;
        if bumped == 0 {
          return Ok(Err(LedgerError::CodeNotFound(code_arg)));
        }

        let inserted = tx.execute(
          "INSERT INTO referral_uses (
             referral_code, referee, used_at, order_id, reward_status, reward_amount
           ) VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5)",
          rusqlite::params![code_arg, referee_arg, used_at, order_arg, amount_cents],
        );
        match inserted {
          Ok(_) => {}
          Err(e) if is_unique_violation(&e) => {
            return Ok(Err(LedgerError::AlreadyReferred(referee_arg)));
          }
          Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok(id))
      })
      .await?;

    let id = match recorded {
      Ok(id) => id,
      Err(e) => {
        warn!(%code, %referee, %order_id, error = %e, "referral use rejected");
        return Err(e.into());
      }
    };

    info!(use_id = id, %code, %referee, %order_id, "recorded referral use");
    Ok(ReferralUse {
      id,
      referral_code: code,
      referee,
      used_at: decode_ts(used_at)?,
      order_id,
      reward_status: UseStatus::Pending,
      reward_amount,
    })
  }

  async fn find_use_by_order(&self, order_id: String) -> Result<Option<ReferralUse>> {
    let raw: Option<RawUse> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {USE_COLUMNS} FROM referral_uses
               WHERE order_id = ?1 ORDER BY id LIMIT 1"
            ),
            rusqlite::params![order_id],
            RawUse::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawUse::into_use).transpose()
  }

  async fn update_use_status(&self, use_id: i64, status: UseStatus) -> Result<ReferralUse> {
    let updated: Result<RawUse, LedgerError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let raw = tx
          .query_row(
            &format!("SELECT {USE_COLUMNS} FROM referral_uses WHERE id = ?1"),
            rusqlite::params![use_id],
            RawUse::from_row,
          )
          .optional()?;
        let Some(mut raw) = raw else {
          return Ok(Err(LedgerError::UseNotFound(use_id)));
        };

        let next = match raw
          .reward_status
          .parse::<UseStatus>()
          .and_then(|current| current.transition(status, use_id))
        {
          Ok(next) => next,
          Err(e) => return Ok(Err(e)),
        };

        tx.execute(
          "UPDATE referral_uses SET reward_status = ?1 WHERE id = ?2",
          rusqlite::params![next.as_str(), use_id],
        )?;
        tx.commit()?;

        raw.reward_status = next.as_str().to_owned();
        Ok(Ok(raw))
      })
      .await?;

    let referral_use = updated?.into_use()?;
    info!(use_id, status = %referral_use.reward_status, "updated referral use status");
    Ok(referral_use)
  }

  // ── Rewards ───────────────────────────────────────────────────────────────

  async fn create_reward(&self, input: NewReward) -> Result<ReferralReward> {
    let now        = self.now();
    let use_id     = input.referral_use_id;
    let expires_at = reward_expiry(now, input.validity_days)?;
    let mut row = RawReward {
      id:                  0,
      recipient:           input.recipient,
      amount:              input.amount.cents(),
      created_at:          encode_ts(now),
      expires_at:          encode_ts(expires_at),
      status:              RewardStatus::Active.as_str().to_owned(),
      referral_use_id:     Some(use_id),
      external_credit_ref: input.external_credit_ref,
    };

    let created: Result<RawReward, LedgerError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let use_exists = tx
          .query_row(
            "SELECT 1 FROM referral_uses WHERE id = ?1",
            rusqlite::params![use_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !use_exists {
          return Ok(Err(LedgerError::UseNotFound(use_id)));
        }

        match row.insert(&tx) {
          Ok(()) => {}
          Err(e) if is_unique_violation(&e) => {
            return Ok(Err(LedgerError::RewardExists(use_id)));
          }
          Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(Ok(row))
      })
      .await?;

    let reward = created?.into_reward()?;
    info!(
      reward_id = reward.id,
      use_id,
      recipient = %reward.recipient,
      amount = %reward.amount,
      "created referral reward"
    );
    Ok(reward)
  }

  async fn settle_reward(&self, use_id: i64, settlement: Settlement) -> Result<ReferralReward> {
    let now        = self.now();
    let created_at = encode_ts(now);
    let expires_at = encode_ts(reward_expiry(now, settlement.validity_days)?);

    let settled: Result<RawReward, LedgerError> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let found = tx
          .query_row(
            "SELECT u.reward_status, u.reward_amount, c.referrer
             FROM referral_uses u
             JOIN referral_codes c ON c.code = u.referral_code
             WHERE u.id = ?1",
            rusqlite::params![use_id],
            |row| {
              Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
              ))
            },
          )
          .optional()?;
        let Some((status, use_amount, referrer)) = found else {
          return Ok(Err(LedgerError::UseNotFound(use_id)));
        };

        if let Err(e) = status
          .parse::<UseStatus>()
          .and_then(|current| current.transition(UseStatus::Completed, use_id))
        {
          return Ok(Err(e));
        }

        let mut row = RawReward {
          id: 0,
          recipient: referrer,
          amount: settlement.amount.map_or(use_amount, Amount::cents),
          created_at,
          expires_at,
          status: RewardStatus::Active.as_str().to_owned(),
          referral_use_id: Some(use_id),
          external_credit_ref: settlement.external_credit_ref,
        };
        match row.insert(&tx) {
          Ok(()) => {}
          Err(e) if is_unique_violation(&e) => {
            return Ok(Err(LedgerError::RewardExists(use_id)));
          }
          Err(e) => return Err(e.into()),
        }

        tx.execute(
          "UPDATE referral_uses SET reward_status = ?1 WHERE id = ?2",
          rusqlite::params![UseStatus::Completed.as_str(), use_id],
        )?;
        tx.commit()?;
        Ok(Ok(row))
      })
      .await?;

    let reward = match settled {
      Ok(row) => row.into_reward()?,
      Err(e) => {
        warn!(use_id, error = %e, "referral settlement refused");
        return Err(e.into());
      }
    };
    info!(
      reward_id = reward.id,
      use_id,
      recipient = %reward.recipient,
      amount = %reward.amount,
      "settled referral reward"
    );
    Ok(reward)
  }

  async fn get_active_rewards(&self, recipient: String) -> Result<Vec<ReferralReward>> {
    let now = encode_ts(self.now());

    let raws: Vec<RawReward> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REWARD_COLUMNS} FROM referral_rewards
           WHERE recipient = ?1 AND status = 'ACTIVE' AND expires_at > ?2
           ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![recipient, now], RawReward::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReward::into_reward).collect()
  }

  async fn list_rewards(&self, recipient: String) -> Result<Vec<ReferralReward>> {
    let raws: Vec<RawReward> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REWARD_COLUMNS} FROM referral_rewards
           WHERE recipient = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![recipient], RawReward::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReward::into_reward).collect()
  }

  // ── Reporting ─────────────────────────────────────────────────────────────

  async fn get_statistics(&self, identity: String) -> Result<ReferralStatistics> {
    let now = encode_ts(self.now());

    let raw: RawStatistics = self
      .conn
      .call(move |conn| {
        let (total_referrals, total_earnings, pending_rewards): (i64, i64, i64) = conn.query_row(
          "SELECT
             COUNT(u.id),
             COALESCE(SUM(u.reward_amount), 0),
             COUNT(CASE WHEN u.reward_status = 'PENDING' THEN 1 END)
           FROM referral_uses u
           JOIN referral_codes c ON c.code = u.referral_code
           WHERE c.referrer = ?1",
          rusqlite::params![identity],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let active_balance: i64 = conn.query_row(
          "SELECT COALESCE(SUM(amount), 0) FROM referral_rewards
           WHERE recipient = ?1 AND status = 'ACTIVE' AND expires_at > ?2",
          rusqlite::params![identity, now],
          |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {CODE_COLUMNS} FROM referral_codes
           WHERE referrer = ?1 AND is_active = 1
           ORDER BY created_at, code"
        ))?;
        let active_codes = stmt
          .query_map(rusqlite::params![identity], RawCode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(RawStatistics {
          total_referrals,
          total_earnings,
          pending_rewards,
          active_balance,
          active_codes,
        })
      })
      .await?;

    raw.into_statistics()
  }
}
