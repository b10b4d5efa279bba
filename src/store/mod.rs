//! Persistence layer for clients, CRM configuration and sync logs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Client, EspoCrmConfig, SyncLog, SyncOutcome, SyncType};

/// Filter for paginated sync-log listings.
#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub status: Option<SyncOutcome>,
    pub sync_type: Option<SyncType>,
    pub page: u32,
    pub per_page: u32,
}

/// Aggregate sync statistics.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncStats {
    pub total_syncs: i64,
    pub successful_syncs: i64,
    pub failed_syncs: i64,
    /// Percentage rounded to two decimals; 0 when no syncs have run.
    pub success_rate: f64,
    pub last_successful_sync: Option<DateTime<Utc>>,
    pub config_active: bool,
}

impl SyncStats {
    /// Compute the success rate from raw counters.
    pub fn from_counts(
        total: i64,
        successful: i64,
        failed: i64,
        last_successful_sync: Option<DateTime<Utc>>,
    ) -> Self {
        let success_rate = if total > 0 {
            (successful as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total_syncs: total,
            successful_syncs: successful,
            failed_syncs: failed,
            success_rate,
            last_successful_sync,
            config_active: false,
        }
    }
}

/// Storage operations the sync subsystem needs.
///
/// The engine only talks to this trait; the Postgres implementation backs
/// the server, the in-memory one backs tests and local development.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // Clients
    async fn find_client(&self, id: Uuid) -> Result<Option<Client>>;
    async fn find_client_by_espocrm_id(&self, espocrm_id: &str) -> Result<Option<Client>>;
    async fn list_clients(&self) -> Result<Vec<Client>>;
    /// Insert or update a client (upsert by id).
    async fn save_client(&self, client: &Client) -> Result<()>;
    async fn delete_client(&self, id: Uuid) -> Result<()>;

    // CRM configuration
    async fn active_config(&self) -> Result<Option<EspoCrmConfig>>;
    async fn find_config(&self, id: Uuid) -> Result<Option<EspoCrmConfig>>;
    /// Insert or update a configuration (upsert by id).
    async fn save_config(&self, config: &EspoCrmConfig) -> Result<()>;

    // Sync logs
    async fn insert_sync_log(&self, log: &SyncLog) -> Result<()>;
    async fn list_sync_logs(&self, filter: &SyncLogFilter) -> Result<(Vec<SyncLog>, i64)>;
    async fn sync_stats(&self) -> Result<SyncStats>;
}
