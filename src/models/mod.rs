//! Data models and entities.

pub mod client;
pub mod espocrm_config;
pub mod sync_log;
pub mod sync_task;

pub use client::Client;
pub use espocrm_config::{EspoCrmConfig, SyncDirection};
pub use sync_log::{SyncLog, SyncOutcome, SyncType};
pub use sync_task::SyncTask;
