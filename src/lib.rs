//! Oracle Feeder Library
//!
//! Commit-reveal exchange rate voting for a Terra validator

pub mod chain;
pub mod config;
pub mod error;
pub mod oracle;
pub mod scheduler;
pub mod types;
pub mod vote;
