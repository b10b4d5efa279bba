//! CLI modules for the CRM bridge.

pub mod sync;
pub mod sync_runner;

pub use sync::{SyncArgs, SyncKind};
pub use sync_runner::run as run_sync;
