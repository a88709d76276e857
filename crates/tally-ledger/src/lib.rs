//! # tally-ledger
//!
//! SQLite-backed storage for Tally: the inbound message log, sender identity
//! links, categories and accounts, and the atomic ledger operations.

pub mod store;

pub use store::{LedgerStats, Store};
