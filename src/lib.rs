//! # Libris Backend Library
//!
//! REST backend for a small lending library: OTP-verified accounts, a book catalog,
//! a borrow/return ledger with overdue fines, and background sweeps for reminders
//! and stale registrations.
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, files, environment)
//! - [`db`]: SQLite schema and indexes
//! - [`error`]: the API error type and its JSON envelope
//! - [`ledger`]: the borrow/return workflow and fine policy
//! - [`accounts`] / [`catalog`]: user and book queries
//! - [`credentials`]: password hashing, session tokens, one-time secrets
//! - [`mail`]: the outgoing mail seam and message templates
//! - [`sweeps`]: scheduled overdue reminders and account purges
//! - [`middleware`] / [`routes`]: the HTTP surface
//! - [`state`]: shared application state

pub mod accounts;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod ledger;
pub mod mail;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod sweeps;
pub mod types;

#[cfg(test)]
mod tests;
