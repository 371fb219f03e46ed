//! SQLite backend for the Sward referral ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{LedgerConfig, SqliteLedger};

#[cfg(test)]
mod tests;
