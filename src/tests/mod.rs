//! Integration and unit tests for the Libris backend.
//!
//! ## Test Modules
//!
//! - **support**: shared fixtures (router over a temp database, manual clock, recording mailer)
//! - **auth_api_tests**: registration, OTP verification, sessions and password recovery
//! - **borrow_api_tests**: borrow/return workflow, fines and concurrent borrows
//! - **catalog_users_tests**: book administration, user listing and admin provisioning
//! - **sweep_tests**: overdue reminders and stale registration purging
//! - **error_tests**: error envelope and validation helpers
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: schema, indexes and constraints
//! - **health_api_tests**: health, metrics and version endpoints
//!
//! Individual modules can be run with:
//! ```bash
//! cargo test borrow_api_tests
//! ```

pub mod support;

pub mod db_tests;
pub mod error_tests;
