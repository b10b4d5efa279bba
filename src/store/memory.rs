//! In-memory store used by tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SyncLogFilter, SyncStats, SyncStore};
use crate::error::Result;
use crate::models::{Client, EspoCrmConfig, SyncLog, SyncOutcome};

/// Store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    clients: RwLock<HashMap<Uuid, Client>>,
    configs: RwLock<HashMap<Uuid, EspoCrmConfig>>,
    logs: RwLock<Vec<SyncLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn find_client(&self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.clients.read().await.get(&id).cloned())
    }

    async fn find_client_by_espocrm_id(&self, espocrm_id: &str) -> Result<Option<Client>> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .find(|c| c.espocrm_id.as_deref() == Some(espocrm_id))
            .cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        clients.sort_by_key(|c| c.created_at);
        Ok(clients)
    }

    async fn save_client(&self, client: &Client) -> Result<()> {
        let mut stored = client.clone();
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.id) {
            stored.updated_at = Some(Utc::now());
        }
        clients.insert(stored.id, stored);
        Ok(())
    }

    async fn delete_client(&self, id: Uuid) -> Result<()> {
        self.clients.write().await.remove(&id);
        Ok(())
    }

    async fn active_config(&self) -> Result<Option<EspoCrmConfig>> {
        let configs = self.configs.read().await;
        let mut active: Vec<&EspoCrmConfig> = configs.values().filter(|c| c.is_active).collect();
        active.sort_by_key(|c| c.created_at);
        Ok(active.first().map(|c| (*c).clone()))
    }

    async fn find_config(&self, id: Uuid) -> Result<Option<EspoCrmConfig>> {
        Ok(self.configs.read().await.get(&id).cloned())
    }

    async fn save_config(&self, config: &EspoCrmConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn insert_sync_log(&self, log: &SyncLog) -> Result<()> {
        self.logs.write().await.push(log.clone());
        Ok(())
    }

    async fn list_sync_logs(&self, filter: &SyncLogFilter) -> Result<(Vec<SyncLog>, i64)> {
        let logs = self.logs.read().await;
        let mut matching: Vec<SyncLog> = logs
            .iter()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.sync_type.map_or(true, |t| l.sync_type == t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let per_page = filter.per_page.clamp(1, 100) as usize;
        let offset = (filter.page.max(1) as usize - 1) * per_page;
        let page: Vec<SyncLog> = matching.into_iter().skip(offset).take(per_page).collect();
        Ok((page, total))
    }

    async fn sync_stats(&self) -> Result<SyncStats> {
        let logs = self.logs.read().await;
        let total = logs.len() as i64;
        let successful = logs
            .iter()
            .filter(|l| l.status == SyncOutcome::Success)
            .count() as i64;
        let failed = logs
            .iter()
            .filter(|l| l.status == SyncOutcome::Error)
            .count() as i64;
        let last_successful_sync = logs
            .iter()
            .filter(|l| l.status == SyncOutcome::Success)
            .map(|l| l.created_at)
            .max();
        Ok(SyncStats::from_counts(
            total,
            successful,
            failed,
            last_successful_sync,
        ))
    }
}
