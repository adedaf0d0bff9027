//! Invitation-gated account registration.
//!
//! Existing users send single-use invitation keys by email, bounded by a
//! per-user quota. Administrators can issue multi-use bulk keys. Signup is
//! refused unless a valid key accompanies it, and each redemption is
//! recorded against the new account.

pub mod common;
pub mod config;
pub mod flow;
pub mod forms;
pub mod mail;
pub mod models;
pub mod postgres_common;
pub mod registration;
pub mod services;
pub mod session;
pub mod store;
pub mod templates;
