//! Reconciliation of Fleet integration policies with write-only secrets.
//!
//! Fleet returns secret variables as opaque references. This crate keeps
//! the plaintext the user supplied in per-resource private state and swaps
//! it back in, so a refreshed model matches the plan that produced it.

pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod lifecycle;
pub mod logging;
pub mod policy;
pub mod reconcile;
pub mod secrets;
pub mod variables;

pub use error::{PolicyError, Result, TransportError};
