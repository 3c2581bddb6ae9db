//! # storelink testkit
//!
//! Helpers for testing storelink connectors without a remote system.
//!
//! This crate provides:
//! - [`TestBackend`]: an in-memory database, a job queue, a job runner and
//!   recorded remote responses wired to one backend
//! - [`fixtures`]: remote payloads and stored responses
//! - [`strategies`]: proptest generators for remote data

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
mod harness;
pub mod strategies;

pub use harness::{filter_args, later, TestBackend};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Sends engine logs to the test output. Filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
