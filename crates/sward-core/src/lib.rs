//! Core types and trait definitions for the Sward referral ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`ledger::ReferralLedger`]; the API layer
//! depends only on that trait.

pub mod clock;
pub mod code;
pub mod error;
pub mod ledger;
pub mod referral;
pub mod validation;

pub use error::{Classify, Error, ErrorKind, Result};
