//! Outcome of checking whether a referee may redeem a code.
//!
//! These are expected business conditions, so they are values, not
//! [`crate::Error`]s.

use serde::{Deserialize, Serialize};

/// Why a code cannot be redeemed by a given referee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
  InvalidCode,
  CodeInactive,
  CodeExpired,
  SelfReferral,
  /// The referee has already redeemed some code, not necessarily this one.
  AlreadyReferred,
}

impl Rejection {
  /// Stable machine-readable reason.
  pub fn reason(self) -> &'static str {
    match self {
      Self::InvalidCode => "INVALID_CODE",
      Self::CodeInactive => "CODE_INACTIVE",
      Self::CodeExpired => "CODE_EXPIRED",
      Self::SelfReferral => "SELF_REFERRAL",
      Self::AlreadyReferred => "ALREADY_REFERRED",
    }
  }

  pub fn message(self) -> &'static str {
    match self {
      Self::InvalidCode => "Invalid referral code",
      Self::CodeInactive => "Referral code is no longer active",
      Self::CodeExpired => "Referral code has expired",
      Self::SelfReferral => "Cannot use your own referral code",
      Self::AlreadyReferred => "You have already used a referral code",
    }
  }
}

/// Result of [`crate::ledger::ReferralLedger::validate_code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CodeCheck {
  Eligible { referrer: String },
  Rejected { reason: Rejection },
}

impl CodeCheck {
  pub fn referrer(&self) -> Option<&str> {
    match self {
      Self::Eligible { referrer } => Some(referrer),
      Self::Rejected { .. } => None,
    }
  }

  pub fn rejection(&self) -> Option<Rejection> {
    match self {
      Self::Eligible { .. } => None,
      Self::Rejected { reason } => Some(*reason),
    }
  }
}

impl From<Rejection> for CodeCheck {
  fn from(reason: Rejection) -> Self { Self::Rejected { reason } }
}
