//! # tally-core
//!
//! Core types, traits, configuration, and error handling for Tally.

pub mod config;
pub mod context;
pub mod error;
pub mod intent;
pub mod ledger;
pub mod message;
pub mod traits;

pub use config::shellexpand;
