//! Error type for `sward-store-sqlite`.

use sward_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A business rule refused the operation.
  #[error(transparent)]
  Ledger(#[from] sward_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A stored value could not be turned back into a domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Ledger(e) => e.kind(),
      Self::Database(_) | Self::Decode(_) => ErrorKind::Internal,
    }
  }

  fn rejection(&self) -> Option<sward_core::validation::Rejection> {
    match self {
      Self::Ledger(e) => e.rejection(),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
