//! Time source for the ledger.
//!
//! The ledger never calls `Utc::now()` directly so that expiry can be tested
//! without sleeping. All ledger timestamps have whole-second resolution.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
  secs: AtomicI64,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { secs: AtomicI64::new(start.timestamp()) }
  }

  pub fn set(&self, at: DateTime<Utc>) {
    self.secs.store(at.timestamp(), Ordering::SeqCst);
  }

  pub fn advance(&self, by: Duration) {
    self.secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0)
      .unwrap_or(DateTime::UNIX_EPOCH)
  }
}
