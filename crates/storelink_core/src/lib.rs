//! # storelink core
//!
//! Persistence contracts and an in-memory transactional store for the
//! storelink connector.
//!
//! This crate provides:
//! - Identifier types for records, bindings and remote ids
//! - Field values as JSON maps
//! - Remote timestamp parsing
//! - The `RecordStore`, `BindingStore` and `LockService` contracts
//! - An in-memory `Database` with closure and manual transactions
//!
//! ## Key Invariants
//!
//! - At most one binding per (backend, model, external id)
//! - At most one binding per (backend, model, record) for 1:1 bound models
//! - Writes are invisible outside a transaction until commit
//! - Advisory locks are released when the transaction ends

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binding;
mod database;
mod error;
mod record;
mod store;
pub mod timestamp;
mod transaction;
mod types;
pub mod values;

pub use binding::{Binding, BindingModel, NewBinding, RecordRef};
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use record::{Record, WriteContext, WriteEvent, WriteTarget};
pub use store::{BindingStore, LockService, RecordStore, Session};
pub use transaction::{Transaction, TransactionState};
pub use types::{BackendId, BindingId, ExternalId, RecordId, TransactionId};
pub use values::Values;

/// Version of the storelink core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
