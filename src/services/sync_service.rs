//! EspoCRM synchronization engine.
//!
//! Business-level sync operations: outbound push, inbound pull, full
//! bidirectional sync and webhook ingestion. Every operation follows the
//! same protocol: resolve the active configuration, gate on the configured
//! direction, perform the work, and record a sync-log entry with its
//! outcome and duration.
//!
//! Direct callers (HTTP handlers, CLI) observe failures as `false`/`None`
//! return values with the error captured in the log; the async worker
//! converts those into propagated errors so the queue retry policy engages.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{AppError, Result};
use crate::models::{Client, EspoCrmConfig, SyncLog, SyncOutcome, SyncType};
use crate::services::espocrm_client::EspoCrmClient;
use crate::store::{SyncStats, SyncStore};

type HmacSha256 = Hmac<Sha256>;

/// Page size used when listing remote accounts during a full sync.
const ACCOUNT_PAGE_SIZE: usize = 200;

/// Aggregated result of one full sync round.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct FullSyncReport {
    pub synced_to_espocrm: u32,
    pub synced_from_espocrm: u32,
    pub errors: u32,
}

/// Result of an explicit connection test.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionTestReport {
    pub success: bool,
    pub message: String,
    #[schema(value_type = Object)]
    pub user_info: Option<Value>,
}

/// CRM client handle cached across operations, invalidated whenever the
/// configuration row it was built from changes.
struct CachedCrmClient {
    config_id: uuid::Uuid,
    config_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    client: Arc<EspoCrmClient>,
}

/// Synchronization engine.
pub struct SyncService {
    store: Arc<dyn SyncStore>,
    crm: tokio::sync::Mutex<Option<CachedCrmClient>>,
}

impl SyncService {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            crm: tokio::sync::Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Resolve the active configuration, or `None` when the integration is
    /// not set up. Best-effort paths use this and skip quietly.
    pub async fn active_config(&self) -> Result<Option<EspoCrmConfig>> {
        self.store.active_config().await
    }

    /// Resolve the active configuration, failing hard when absent. Used on
    /// strict call paths (CLI, direct API calls).
    pub async fn require_active_config(&self) -> Result<EspoCrmConfig> {
        self.store
            .active_config()
            .await?
            .ok_or(AppError::ConfigurationMissing)
    }

    /// One shared client per active configuration, so the bearer token is
    /// reused across operations in this process.
    async fn crm_client(&self, config: &EspoCrmConfig) -> Result<Arc<EspoCrmClient>> {
        let mut cached = self.crm.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.config_id == config.id && entry.config_updated_at == config.updated_at {
                return Ok(entry.client.clone());
            }
        }
        let client = Arc::new(EspoCrmClient::from_config(config)?);
        *cached = Some(CachedCrmClient {
            config_id: config.id,
            config_updated_at: config.updated_at,
            client: client.clone(),
        });
        Ok(client)
    }

    /// Push one local client to EspoCRM.
    ///
    /// Creates the remote Account when the client has no `espocrm_id` yet
    /// (persisting the new remote id locally), otherwise replaces the
    /// existing Account. Returns `false` when skipped or failed; the
    /// failure reason lives in the sync log.
    pub async fn sync_client_to_espocrm(&self, client: &mut Client) -> Result<bool> {
        let config = match self.active_config().await? {
            Some(config) if config.outbound_sync_enabled() => config,
            _ => return Ok(false),
        };

        let mut log = SyncLog::begin(SyncType::ClientToEspocrm)
            .entity_type("Client")
            .entity_id(client.id.to_string());

        match self.push_client(&config, client).await {
            Ok(espocrm_id) => {
                log.espocrm_id = Some(espocrm_id);
                log.mark_completed(SyncOutcome::Success, "Client synced to EspoCRM");
                self.store.insert_sync_log(&log).await?;
                Ok(true)
            }
            Err(e) => {
                log.mark_failed(e.to_string(), None);
                self.store.insert_sync_log(&log).await?;
                tracing::error!(client_id = %client.id, error = %e, "Client sync to EspoCRM failed");
                Ok(false)
            }
        }
    }

    async fn push_client(&self, config: &EspoCrmConfig, client: &mut Client) -> Result<String> {
        let crm = self.crm_client(config).await?;
        let payload = account_payload(client);

        match client.espocrm_id.clone() {
            Some(espocrm_id) => {
                // Full replace of the existing remote record
                crm.put(&format!("Account/{espocrm_id}"), &payload).await?;
                Ok(espocrm_id)
            }
            None => {
                let response = crm.post("Account", &payload).await?;
                let espocrm_id = response
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AppError::Validation("EspoCRM create response missing id".into())
                    })?
                    .to_string();
                client.espocrm_id = Some(espocrm_id.clone());
                self.store.save_client(client).await?;
                Ok(espocrm_id)
            }
        }
    }

    /// Pull one remote Account into local storage, upserting by remote id.
    ///
    /// All mapped fields are overwritten from the remote payload
    /// (last-writer-wins). Returns the synced client, or `None` when
    /// skipped or failed.
    pub async fn sync_client_from_espocrm(&self, espocrm_id: &str) -> Result<Option<Client>> {
        let config = match self.active_config().await? {
            Some(config) if config.inbound_sync_enabled() => config,
            _ => return Ok(None),
        };

        let mut log = SyncLog::begin(SyncType::EspocrmToClient)
            .entity_type("Client")
            .espocrm_id(espocrm_id);

        match self.pull_client(&config, espocrm_id).await {
            Ok(client) => {
                log.entity_id = Some(client.id.to_string());
                log.mark_completed(SyncOutcome::Success, "Client synced from EspoCRM");
                self.store.insert_sync_log(&log).await?;
                Ok(Some(client))
            }
            Err(e) => {
                log.mark_failed(e.to_string(), None);
                self.store.insert_sync_log(&log).await?;
                tracing::error!(espocrm_id, error = %e, "Client sync from EspoCRM failed");
                Ok(None)
            }
        }
    }

    async fn pull_client(&self, config: &EspoCrmConfig, espocrm_id: &str) -> Result<Client> {
        let crm = self.crm_client(config).await?;
        let response = crm.get(&format!("Account/{espocrm_id}")).await?;

        if response.get("id").and_then(Value::as_str).is_none() {
            return Err(AppError::NotFound(format!(
                "Account {espocrm_id} not found in EspoCRM"
            )));
        }

        // Upsert by remote id, never by name
        let mut client = match self.store.find_client_by_espocrm_id(espocrm_id).await? {
            Some(existing) => existing,
            None => {
                let mut created = Client::new("");
                created.espocrm_id = Some(espocrm_id.to_string());
                created
            }
        };

        apply_account_fields(&mut client, &response);
        self.store.save_client(&client).await?;
        Ok(client)
    }

    /// One full round: every local client out, every remote account in,
    /// according to the configured direction.
    ///
    /// Per-item failures are counted and never abort the batch;
    /// `last_sync_at` is updated regardless of partial errors. A missing
    /// configuration is fatal for the whole batch.
    pub async fn full_sync(&self) -> Result<FullSyncReport> {
        let mut config = self.require_active_config().await?;
        let mut report = FullSyncReport::default();

        if config.outbound_sync_enabled() {
            let clients = self.store.list_clients().await?;
            for mut client in clients {
                match self.sync_client_to_espocrm(&mut client).await {
                    Ok(true) => report.synced_to_espocrm += 1,
                    Ok(false) => report.errors += 1,
                    Err(e) => {
                        tracing::error!(client_id = %client.id, error = %e, "Outbound sync failed");
                        report.errors += 1;
                    }
                }
            }
        }

        if config.inbound_sync_enabled() {
            if let Err(e) = self.pull_all_accounts(&config, &mut report).await {
                tracing::error!(error = %e, "Failed to list EspoCRM accounts");
                report.errors += 1;
            }
        }

        config.last_sync_at = Some(chrono::Utc::now());
        self.store.save_config(&config).await?;

        tracing::info!(
            synced_to_espocrm = report.synced_to_espocrm,
            synced_from_espocrm = report.synced_from_espocrm,
            errors = report.errors,
            "Full EspoCRM sync finished"
        );
        Ok(report)
    }

    async fn pull_all_accounts(
        &self,
        config: &EspoCrmConfig,
        report: &mut FullSyncReport,
    ) -> Result<()> {
        let crm = self.crm_client(config).await?;
        let mut offset = 0usize;

        loop {
            let response = crm
                .get(&format!(
                    "Account?maxSize={ACCOUNT_PAGE_SIZE}&offset={offset}"
                ))
                .await?;
            let accounts = response
                .get("list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for account in &accounts {
                let Some(espocrm_id) = account.get("id").and_then(Value::as_str) else {
                    report.errors += 1;
                    continue;
                };
                match self.sync_client_from_espocrm(espocrm_id).await {
                    Ok(Some(_)) => report.synced_from_espocrm += 1,
                    Ok(None) => report.errors += 1,
                    Err(e) => {
                        tracing::error!(espocrm_id, error = %e, "Inbound sync failed");
                        report.errors += 1;
                    }
                }
            }

            if accounts.len() < ACCOUNT_PAGE_SIZE {
                return Ok(());
            }
            offset += ACCOUNT_PAGE_SIZE;
        }
    }

    /// Ingest a webhook payload announced by EspoCRM.
    ///
    /// When a webhook secret is configured the payload signature is
    /// verified first and processing fails closed on mismatch. Returns
    /// `false` when webhooks are disabled or processing failed.
    pub async fn process_webhook(&self, payload: &Value, signature: Option<&str>) -> Result<bool> {
        let config = match self.active_config().await? {
            Some(config) if config.webhook_enabled => config,
            _ => return Ok(false),
        };

        let mut log = SyncLog::begin(SyncType::Webhook).data(payload.clone());

        match self.handle_webhook(&config, payload, signature, &mut log).await {
            Ok(()) => {
                log.mark_completed(SyncOutcome::Success, "Webhook processed");
                self.store.insert_sync_log(&log).await?;
                Ok(true)
            }
            Err(e) => {
                log.mark_failed(e.to_string(), None);
                self.store.insert_sync_log(&log).await?;
                tracing::error!(error = %e, "Webhook processing failed");
                Ok(false)
            }
        }
    }

    async fn handle_webhook(
        &self,
        config: &EspoCrmConfig,
        payload: &Value,
        signature: Option<&str>,
        log: &mut SyncLog,
    ) -> Result<()> {
        if let Some(secret) = config.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
            if !verify_webhook_signature(secret, payload, signature) {
                return Err(AppError::SignatureVerification);
            }
        }

        let entity_type = payload.get("entityType").and_then(Value::as_str);
        let entity_id = payload.get("entityId").and_then(Value::as_str);
        let action = payload.get("action").and_then(Value::as_str);

        let (Some(entity_type), Some(entity_id), Some(action)) = (entity_type, entity_id, action)
        else {
            return Err(AppError::Validation("Incomplete webhook payload".into()));
        };

        log.entity_type = Some(entity_type.to_string());
        log.espocrm_id = Some(entity_id.to_string());

        match entity_type {
            "Account" => self.handle_account_webhook(entity_id, action).await?,
            "Contact" => {
                // Extension seam: contacts are observed, not acted on yet
                tracing::info!(entity_id, action, "Contact webhook received");
            }
            other => {
                tracing::info!(entity_type = other, "Unhandled webhook entity type");
            }
        }
        Ok(())
    }

    /// Webhook payloads carry no ordering or version token, so a stale
    /// `delete` processed after a re-create removes the fresh record.
    async fn handle_account_webhook(&self, entity_id: &str, action: &str) -> Result<()> {
        match action {
            "create" | "update" => {
                self.sync_client_from_espocrm(entity_id).await?;
            }
            "delete" => {
                if let Some(client) = self.store.find_client_by_espocrm_id(entity_id).await? {
                    self.store.delete_client(client.id).await?;
                    tracing::info!(client_id = %client.id, espocrm_id = entity_id, "Client removed after remote delete");
                }
            }
            other => {
                tracing::info!(action = other, "Unhandled Account webhook action");
            }
        }
        Ok(())
    }

    /// Aggregate sync statistics for the admin surface.
    pub async fn sync_stats(&self) -> Result<SyncStats> {
        let mut stats = self.store.sync_stats().await?;
        stats.config_active = self.active_config().await?.is_some();
        Ok(stats)
    }

    /// Test connectivity and credentials against the configured instance.
    pub async fn test_connection(&self) -> Result<ConnectionTestReport> {
        let config = self.require_active_config().await?;
        let crm = self.crm_client(&config).await?;

        match crm.test_connection().await {
            Ok(user_info) => Ok(ConnectionTestReport {
                success: true,
                message: "EspoCRM connection successful".into(),
                user_info: Some(user_info),
            }),
            Err(e) => Ok(ConnectionTestReport {
                success: false,
                message: format!("EspoCRM connection failed: {e}"),
                user_info: None,
            }),
        }
    }
}

/// Shape a local client as an EspoCRM Account payload.
fn account_payload(client: &Client) -> Value {
    json!({
        "name": client.company_name,
        "type": "Customer",
        "phoneNumber": client.phone,
        "emailAddress": client.email,
        "billingAddress": client.address,
        "billingAddressCity": client.city,
        "billingAddressPostalCode": client.postal_code,
        "billingAddressCountry": client.country,
        "vatNumber": client.vat_number,
        "description": client.notes,
    })
}

/// Overwrite the mapped client fields from a remote Account payload.
fn apply_account_fields(client: &mut Client, data: &Value) {
    let text = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    client.company_name = text("name").unwrap_or_default();
    client.phone = text("phoneNumber");
    client.email = text("emailAddress");
    client.address = text("billingAddress");
    client.city = text("billingAddressCity");
    client.postal_code = text("billingAddressPostalCode");
    client.country = text("billingAddressCountry");
    client.vat_number = text("vatNumber");
    client.notes = text("description");
}

/// Check an HMAC-SHA256 hex signature of the canonical JSON payload.
///
/// Comparison is constant-time via `Mac::verify_slice`. A missing or
/// non-hex signature fails verification.
fn verify_webhook_signature(secret: &str, payload: &Value, signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let canonical = payload.to_string();
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
