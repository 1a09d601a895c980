//! Sync: push local order state to the remote order service
//!
//! ```text
//! SyncWorker
//!   ├── Startup: sync every unsynced order
//!   ├── Periodic: sync on a fixed interval
//!   ├── SyncHandle::request_sync → sync now
//!   └── SyncHandle::push_status → push one status change
//! ```
//!
//! An order is marked synced only after the remote acknowledged the status
//! the order still has locally.

pub mod reconciler;
pub mod remote;
pub mod retry;
pub mod worker;

pub use reconciler::{SyncReconciler, SyncReport};
pub use remote::{HttpRemoteOrderService, OrderPayload, RemoteError, RemoteOrderService, StatusUpdate};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use worker::{SyncCommand, SyncHandle, SyncWorker};
