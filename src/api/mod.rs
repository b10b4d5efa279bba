//! API module - HTTP handlers and routing.

pub mod handlers;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::services::sync_service::SyncService;
use crate::services::sync_worker::SyncDispatcher;
use crate::store::SyncStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SyncStore>,
    pub sync: Arc<SyncService>,
    pub dispatcher: SyncDispatcher,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SyncStore>,
        sync: Arc<SyncService>,
        dispatcher: SyncDispatcher,
    ) -> Self {
        Self {
            config,
            store,
            sync,
            dispatcher,
        }
    }
}

pub type SharedState = Arc<AppState>;
