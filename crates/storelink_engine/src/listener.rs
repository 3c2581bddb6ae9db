//! Write listeners.
//!
//! Listeners react to local writes, typically by scheduling an export. They
//! run before the transaction of the job commits, see
//! [`SyncContext::dispatch_write_events`].

use crate::environment::SyncContext;
use crate::error::SyncResult;
use storelink_core::WriteEvent;

/// Reacts to writes on one model.
pub trait WriteListener: Send + Sync {
    /// Handles one write.
    fn on_write(&self, ctx: &mut SyncContext<'_>, event: &WriteEvent) -> SyncResult<()>;
}
