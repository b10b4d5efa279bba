//! Postgres-backed store.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{SyncLogFilter, SyncStats, SyncStore};
use crate::error::Result;
use crate::models::{Client, EspoCrmConfig, SyncLog};

/// Store implementation over the shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn find_client(&self, id: Uuid) -> Result<Option<Client>> {
        let client: Option<Client> = sqlx::query_as(
            r#"
            SELECT id, company_name, siret, vat_number, phone, email, address,
                   postal_code, city, country, status, notes, espocrm_id,
                   created_at, updated_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(client)
    }

    async fn find_client_by_espocrm_id(&self, espocrm_id: &str) -> Result<Option<Client>> {
        let client: Option<Client> = sqlx::query_as(
            r#"
            SELECT id, company_name, siret, vat_number, phone, email, address,
                   postal_code, city, country, status, notes, espocrm_id,
                   created_at, updated_at
            FROM clients
            WHERE espocrm_id = $1
            "#,
        )
        .bind(espocrm_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(client)
    }

    async fn list_clients(&self) -> Result<Vec<Client>> {
        let clients: Vec<Client> = sqlx::query_as(
            r#"
            SELECT id, company_name, siret, vat_number, phone, email, address,
                   postal_code, city, country, status, notes, espocrm_id,
                   created_at, updated_at
            FROM clients
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    async fn save_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (
                id, company_name, siret, vat_number, phone, email, address,
                postal_code, city, country, status, notes, espocrm_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                company_name = EXCLUDED.company_name,
                siret = EXCLUDED.siret,
                vat_number = EXCLUDED.vat_number,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                postal_code = EXCLUDED.postal_code,
                city = EXCLUDED.city,
                country = EXCLUDED.country,
                status = EXCLUDED.status,
                notes = EXCLUDED.notes,
                espocrm_id = EXCLUDED.espocrm_id,
                updated_at = NOW()
            "#,
        )
        .bind(client.id)
        .bind(&client.company_name)
        .bind(&client.siret)
        .bind(&client.vat_number)
        .bind(&client.phone)
        .bind(&client.email)
        .bind(&client.address)
        .bind(&client.postal_code)
        .bind(&client.city)
        .bind(&client.country)
        .bind(&client.status)
        .bind(&client.notes)
        .bind(&client.espocrm_id)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_client(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_config(&self) -> Result<Option<EspoCrmConfig>> {
        let config: Option<EspoCrmConfig> = sqlx::query_as(
            r#"
            SELECT id, api_url, api_key, username, webhook_url, webhook_secret,
                   is_active, sync_enabled, webhook_enabled, sync_direction,
                   created_at, updated_at, last_sync_at
            FROM espocrm_configs
            WHERE is_active = true
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn find_config(&self, id: Uuid) -> Result<Option<EspoCrmConfig>> {
        let config: Option<EspoCrmConfig> = sqlx::query_as(
            r#"
            SELECT id, api_url, api_key, username, webhook_url, webhook_secret,
                   is_active, sync_enabled, webhook_enabled, sync_direction,
                   created_at, updated_at, last_sync_at
            FROM espocrm_configs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn save_config(&self, config: &EspoCrmConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO espocrm_configs (
                id, api_url, api_key, username, webhook_url, webhook_secret,
                is_active, sync_enabled, webhook_enabled, sync_direction,
                created_at, updated_at, last_sync_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                api_url = EXCLUDED.api_url,
                api_key = EXCLUDED.api_key,
                username = EXCLUDED.username,
                webhook_url = EXCLUDED.webhook_url,
                webhook_secret = EXCLUDED.webhook_secret,
                is_active = EXCLUDED.is_active,
                sync_enabled = EXCLUDED.sync_enabled,
                webhook_enabled = EXCLUDED.webhook_enabled,
                sync_direction = EXCLUDED.sync_direction,
                updated_at = EXCLUDED.updated_at,
                last_sync_at = EXCLUDED.last_sync_at
            "#,
        )
        .bind(config.id)
        .bind(&config.api_url)
        .bind(&config.api_key)
        .bind(&config.username)
        .bind(&config.webhook_url)
        .bind(&config.webhook_secret)
        .bind(config.is_active)
        .bind(config.sync_enabled)
        .bind(config.webhook_enabled)
        .bind(config.sync_direction)
        .bind(config.created_at)
        .bind(config.updated_at)
        .bind(config.last_sync_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_sync_log(&self, log: &SyncLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO espocrm_sync_logs (
                id, sync_type, status, entity_type, entity_id, espocrm_id,
                message, data, error_details, created_at, completed_at, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(log.id)
        .bind(log.sync_type)
        .bind(log.status)
        .bind(&log.entity_type)
        .bind(&log.entity_id)
        .bind(&log.espocrm_id)
        .bind(&log.message)
        .bind(&log.data)
        .bind(&log.error_details)
        .bind(log.created_at)
        .bind(log.completed_at)
        .bind(log.duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sync_logs(&self, filter: &SyncLogFilter) -> Result<(Vec<SyncLog>, i64)> {
        let per_page = filter.per_page.clamp(1, 100) as i64;
        let offset = (filter.page.max(1) as i64 - 1) * per_page;

        let logs: Vec<SyncLog> = sqlx::query_as(
            r#"
            SELECT id, sync_type, status, entity_type, entity_id, espocrm_id,
                   message, data, error_details, created_at, completed_at, duration_ms
            FROM espocrm_sync_logs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR sync_type = $2)
            ORDER BY created_at DESC
            OFFSET $3
            LIMIT $4
            "#,
        )
        .bind(filter.status)
        .bind(filter.sync_type)
        .bind(offset)
        .bind(per_page)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM espocrm_sync_logs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR sync_type = $2)
            "#,
        )
        .bind(filter.status)
        .bind(filter.sync_type)
        .fetch_one(&self.pool)
        .await?;

        Ok((logs, total))
    }

    async fn sync_stats(&self) -> Result<SyncStats> {
        let (total, successful, failed): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'success'),
                COUNT(*) FILTER (WHERE status = 'error')
            FROM espocrm_sync_logs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let last_successful_sync: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
            r#"
            SELECT created_at
            FROM espocrm_sync_logs
            WHERE status = 'success'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(SyncStats::from_counts(
            total,
            successful,
            failed,
            last_successful_sync,
        ))
    }
}
