//! SQL schema for the Sward SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Customer identity store consulted when referrers must be known.
CREATE TABLE IF NOT EXISTS customers (
    identity    TEXT PRIMARY KEY,
    created_at  INTEGER NOT NULL     -- Unix epoch seconds
);

-- Codes are deactivated, never deleted.
CREATE TABLE IF NOT EXISTS referral_codes (
    code        TEXT PRIMARY KEY,
    referrer    TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER,             -- NULL = never expires
    usage_count INTEGER NOT NULL DEFAULT 0,
    is_active   INTEGER NOT NULL DEFAULT 1
);

-- One row per redemption. UNIQUE (referee) is what actually stops a
-- customer from being referred twice; the pre-check in validation is advisory.
CREATE TABLE IF NOT EXISTS referral_uses (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    referral_code TEXT NOT NULL REFERENCES referral_codes(code),
    referee       TEXT NOT NULL,
    used_at       INTEGER NOT NULL,
    order_id      TEXT NOT NULL,
    reward_status TEXT NOT NULL DEFAULT 'PENDING'
                  CHECK (reward_status IN ('PENDING', 'COMPLETED')),
    reward_amount INTEGER NOT NULL,  -- cents
    UNIQUE (referee)
);

CREATE TABLE IF NOT EXISTS referral_rewards (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient           TEXT NOT NULL,
    amount              INTEGER NOT NULL,  -- cents
    created_at          INTEGER NOT NULL,
    expires_at          INTEGER NOT NULL,
    status              TEXT NOT NULL DEFAULT 'ACTIVE',
    referral_use_id     INTEGER REFERENCES referral_uses(id),
    external_credit_ref TEXT,
    UNIQUE (referral_use_id)
);

CREATE INDEX IF NOT EXISTS codes_referrer_idx    ON referral_codes(referrer);
CREATE INDEX IF NOT EXISTS uses_code_idx         ON referral_uses(referral_code);
CREATE INDEX IF NOT EXISTS uses_order_idx        ON referral_uses(order_id);
CREATE INDEX IF NOT EXISTS rewards_recipient_idx ON referral_rewards(recipient);

PRAGMA user_version = 1;
";
