//! Error types for `sward-core`.

use thiserror::Error;

use crate::{referral::UseStatus, validation::Rejection};

#[derive(Debug, Error)]
pub enum Error {
  #[error("referral code not found: {0}")]
  CodeNotFound(String),

  #[error("referral use not found: {0}")]
  UseNotFound(i64),

  /// The referee already has a recorded use, possibly of another code.
  #[error("{0} has already used a referral code")]
  AlreadyReferred(String),

  #[error("referral use {0} is already settled")]
  AlreadySettled(i64),

  #[error("cannot move referral use from {from} to {to}")]
  InvalidTransition { from: UseStatus, to: UseStatus },

  #[error("referral use {0} already has a reward")]
  RewardExists(i64),

  #[error("referrer is not a known customer: {0}")]
  UnknownReferrer(String),

  #[error("lifetime of {0} days is out of range")]
  InvalidLifetime(u32),

  #[error("could not find a free referral code")]
  CodeSpaceExhausted,

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse category of a failure, used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  /// The request collides with existing state (duplicate referee, double
  /// settlement, second reward for a use).
  Conflict,
  Invalid,
  Internal,
}

/// Implemented by every ledger error type so callers can map failures
/// without knowing the backend.
pub trait Classify {
  fn kind(&self) -> ErrorKind;

  /// The validation reason equivalent to this failure, if any. A referee
  /// conflict at record time means the same thing as `ALREADY_REFERRED`.
  fn rejection(&self) -> Option<Rejection> { None }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::CodeNotFound(_)
      | Self::UseNotFound(_)
      | Self::UnknownReferrer(_) => ErrorKind::NotFound,
      Self::AlreadyReferred(_)
      | Self::AlreadySettled(_)
      | Self::RewardExists(_) => ErrorKind::Conflict,
      Self::InvalidTransition { .. }
      | Self::InvalidLifetime(_)
      | Self::UnknownStatus(_) => ErrorKind::Invalid,
      Self::CodeSpaceExhausted => ErrorKind::Internal,
    }
  }

  fn rejection(&self) -> Option<Rejection> {
    match self {
      Self::AlreadyReferred(_) => Some(Rejection::AlreadyReferred),
      _ => None,
    }
  }
}

impl Classify for std::convert::Infallible {
  fn kind(&self) -> ErrorKind { match *self {} }
}
