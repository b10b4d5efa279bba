//! EspoCRM administration handlers: configuration CRUD, sync triggers,
//! statistics and sync-log listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::{EspoCrmConfig, SyncDirection, SyncOutcome, SyncTask, SyncType};
use crate::services::sync_service::{ConnectionTestReport, FullSyncReport};
use crate::store::{SyncLogFilter, SyncStats};

#[derive(OpenApi)]
#[openapi(
    paths(
        get_config,
        create_config,
        update_config,
        test_connection,
        sync_stats,
        trigger_full_sync,
        sync_client,
        list_sync_logs
    ),
    components(schemas(
        ConfigResponse,
        CreateConfigRequest,
        UpdateConfigRequest,
        TriggerSyncRequest,
        ConnectionTestReport,
        FullSyncReport,
        SyncStats
    ))
)]
pub struct EspoCrmApiDoc;

/// Build the router for `/api/espocrm`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/config", get(get_config).post(create_config))
        .route("/config/:id", put(update_config))
        .route("/test-connection", post(test_connection))
        .route("/sync/stats", get(sync_stats))
        .route("/sync/full", post(trigger_full_sync))
        .route("/sync/client/:id", post(sync_client))
        .route("/logs", get(list_sync_logs))
}

// ---------------------------------------------------------------------------
// Configuration CRUD
// ---------------------------------------------------------------------------

/// Configuration as exposed over the API. Secrets never leave the server.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub id: Uuid,
    pub api_url: String,
    pub username: String,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    pub sync_enabled: bool,
    pub webhook_enabled: bool,
    pub sync_direction: SyncDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<&EspoCrmConfig> for ConfigResponse {
    fn from(config: &EspoCrmConfig) -> Self {
        Self {
            id: config.id,
            api_url: config.api_url.clone(),
            username: config.username.clone(),
            webhook_url: config.webhook_url.clone(),
            is_active: config.is_active,
            sync_enabled: config.sync_enabled,
            webhook_enabled: config.webhook_enabled,
            sync_direction: config.sync_direction,
            created_at: config.created_at,
            updated_at: config.updated_at,
            last_sync_at: config.last_sync_at,
        }
    }
}

/// Get the active EspoCRM configuration
#[utoipa::path(
    get,
    path = "/config",
    context_path = "/api/espocrm",
    tag = "espocrm",
    responses(
        (status = 200, description = "Active configuration", body = ConfigResponse),
        (status = 404, description = "No configuration exists"),
    )
)]
async fn get_config(State(state): State<SharedState>) -> Result<Response> {
    match state.store.active_config().await? {
        Some(config) => Ok(Json(json!({
            "success": true,
            "config": ConfigResponse::from(&config),
        }))
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "message": "No EspoCRM configuration found",
            })),
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConfigRequest {
    pub api_url: String,
    pub api_key: String,
    pub username: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub is_active: Option<bool>,
    pub sync_enabled: Option<bool>,
    pub webhook_enabled: Option<bool>,
    pub sync_direction: Option<SyncDirection>,
}

/// Create the EspoCRM configuration
#[utoipa::path(
    post,
    path = "/config",
    context_path = "/api/espocrm",
    tag = "espocrm",
    request_body = CreateConfigRequest,
    responses(
        (status = 201, description = "Configuration created"),
        (status = 400, description = "Invalid request or an active configuration already exists"),
    )
)]
async fn create_config(
    State(state): State<SharedState>,
    Json(req): Json<CreateConfigRequest>,
) -> Result<Response> {
    for (field, value) in [
        ("api_url", &req.api_url),
        ("api_key", &req.api_key),
        ("username", &req.username),
    ] {
        if value.trim().is_empty() {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                format!("The '{field}' field is required"),
            ));
        }
    }

    // Only one active configuration may exist at a time
    if state.store.active_config().await?.is_some() {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "An active EspoCRM configuration already exists".to_string(),
        ));
    }

    let mut config = EspoCrmConfig::new(&req.api_url, req.api_key, req.username);
    config.webhook_url = req.webhook_url;
    config.webhook_secret = req.webhook_secret;
    config.is_active = req.is_active.unwrap_or(true);
    config.sync_enabled = req.sync_enabled.unwrap_or(true);
    config.webhook_enabled = req.webhook_enabled.unwrap_or(true);
    config.sync_direction = req.sync_direction.unwrap_or(SyncDirection::Bidirectional);
    config.updated_at = Some(Utc::now());

    state.store.save_config(&config).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "EspoCRM configuration created",
            "config_id": config.id,
        })),
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateConfigRequest {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub is_active: Option<bool>,
    pub sync_enabled: Option<bool>,
    pub webhook_enabled: Option<bool>,
    pub sync_direction: Option<SyncDirection>,
}

/// Partially update an EspoCRM configuration
#[utoipa::path(
    put,
    path = "/config/{id}",
    context_path = "/api/espocrm",
    tag = "espocrm",
    request_body = UpdateConfigRequest,
    responses(
        (status = 200, description = "Configuration updated"),
        (status = 404, description = "Configuration not found"),
    )
)]
async fn update_config(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConfigRequest>,
) -> Result<Json<serde_json::Value>> {
    let mut config = state
        .store
        .find_config(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("EspoCRM configuration {id} not found")))?;

    if let Some(api_url) = req.api_url {
        config.set_api_url(&api_url);
    }
    if let Some(api_key) = req.api_key {
        config.api_key = api_key;
    }
    if let Some(username) = req.username {
        config.username = username;
    }
    if let Some(webhook_url) = req.webhook_url {
        config.webhook_url = Some(webhook_url);
    }
    if let Some(webhook_secret) = req.webhook_secret {
        config.webhook_secret = Some(webhook_secret);
    }
    if let Some(is_active) = req.is_active {
        config.is_active = is_active;
    }
    if let Some(sync_enabled) = req.sync_enabled {
        config.sync_enabled = sync_enabled;
    }
    if let Some(webhook_enabled) = req.webhook_enabled {
        config.webhook_enabled = webhook_enabled;
    }
    if let Some(sync_direction) = req.sync_direction {
        config.sync_direction = sync_direction;
    }
    config.updated_at = Some(Utc::now());

    state.store.save_config(&config).await?;

    Ok(Json(json!({
        "success": true,
        "message": "EspoCRM configuration updated",
    })))
}

// ---------------------------------------------------------------------------
// Connection test and statistics
// ---------------------------------------------------------------------------

/// Test the EspoCRM connection with the active configuration
#[utoipa::path(
    post,
    path = "/test-connection",
    context_path = "/api/espocrm",
    tag = "espocrm",
    responses(
        (status = 200, description = "Connection successful", body = ConnectionTestReport),
        (status = 400, description = "Connection failed"),
        (status = 404, description = "No active configuration"),
    )
)]
async fn test_connection(State(state): State<SharedState>) -> Result<Response> {
    let report = state.sync.test_connection().await?;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((
        status,
        Json(json!({
            "success": report.success,
            "message": report.message,
            "user_info": report.user_info,
        })),
    )
        .into_response())
}

/// Get synchronization statistics
#[utoipa::path(
    get,
    path = "/sync/stats",
    context_path = "/api/espocrm",
    tag = "espocrm",
    responses((status = 200, description = "Sync statistics", body = SyncStats))
)]
async fn sync_stats(State(state): State<SharedState>) -> Result<Json<serde_json::Value>> {
    let stats = state.sync.sync_stats().await?;
    Ok(Json(json!({
        "success": true,
        "stats": stats,
    })))
}

// ---------------------------------------------------------------------------
// Sync triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TriggerSyncRequest {
    /// Run through the background worker (default) or inline.
    #[serde(default, rename = "async")]
    pub async_mode: Option<bool>,
}

/// Trigger a full synchronization round
#[utoipa::path(
    post,
    path = "/sync/full",
    context_path = "/api/espocrm",
    tag = "espocrm",
    request_body = TriggerSyncRequest,
    responses(
        (status = 200, description = "Sync scheduled or finished"),
        (status = 404, description = "No active configuration"),
    )
)]
async fn trigger_full_sync(
    State(state): State<SharedState>,
    body: Option<Json<TriggerSyncRequest>>,
) -> Result<Json<serde_json::Value>> {
    // Direct API call: missing configuration is a hard error
    state.sync.require_active_config().await?;

    let async_mode = body
        .and_then(|Json(req)| req.async_mode)
        .unwrap_or(true);

    if async_mode {
        state.dispatcher.dispatch(SyncTask::for_full_sync())?;
        Ok(Json(json!({
            "success": true,
            "message": "Full sync scheduled for asynchronous processing",
        })))
    } else {
        let report = state.sync.full_sync().await?;
        Ok(Json(json!({
            "success": true,
            "message": "Full sync finished",
            "report": report,
        })))
    }
}

/// Trigger synchronization of one client to EspoCRM
#[utoipa::path(
    post,
    path = "/sync/client/{id}",
    context_path = "/api/espocrm",
    tag = "espocrm",
    request_body = TriggerSyncRequest,
    responses(
        (status = 200, description = "Sync scheduled or finished"),
        (status = 404, description = "Client or configuration not found"),
        (status = 500, description = "Synchronous sync failed"),
    )
)]
async fn sync_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    body: Option<Json<TriggerSyncRequest>>,
) -> Result<Response> {
    let mut client = state
        .store
        .find_client(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Client {id} not found")))?;

    state.sync.require_active_config().await?;

    let async_mode = body
        .and_then(|Json(req)| req.async_mode)
        .unwrap_or(true);

    if async_mode {
        state
            .dispatcher
            .dispatch(SyncTask::for_client_to_espocrm(id))?;
        return Ok(Json(json!({
            "success": true,
            "message": format!("Sync of client {id} scheduled for asynchronous processing"),
        }))
        .into_response());
    }

    if state.sync.sync_client_to_espocrm(&mut client).await? {
        Ok(Json(json!({
            "success": true,
            "message": format!("Client {id} synced to EspoCRM"),
        }))
        .into_response())
    } else {
        Ok(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to sync client {id} to EspoCRM"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Sync logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub sync_type: Option<String>,
}

/// List sync logs, newest first
#[utoipa::path(
    get,
    path = "/logs",
    context_path = "/api/espocrm",
    tag = "espocrm",
    params(LogsQuery),
    responses((status = 200, description = "Paginated sync logs"))
)]
async fn list_sync_logs(
    State(state): State<SharedState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>> {
    let filter = SyncLogFilter {
        status: query.status.as_deref().map(parse_status).transpose()?,
        sync_type: query.sync_type.as_deref().map(parse_sync_type).transpose()?,
        page: query.page.unwrap_or(1).max(1),
        per_page: query.limit.unwrap_or(50).min(100),
    };

    let (logs, total) = state.store.list_sync_logs(&filter).await?;
    let pages = (total as f64 / filter.per_page as f64).ceil() as i64;

    Ok(Json(json!({
        "success": true,
        "logs": logs,
        "pagination": {
            "page": filter.page,
            "limit": filter.per_page,
            "total": total,
            "pages": pages,
        },
    })))
}

fn parse_status(value: &str) -> Result<SyncOutcome> {
    match value {
        "pending" => Ok(SyncOutcome::Pending),
        "success" => Ok(SyncOutcome::Success),
        "error" => Ok(SyncOutcome::Error),
        other => Err(AppError::Validation(format!("Unknown status '{other}'"))),
    }
}

fn parse_sync_type(value: &str) -> Result<SyncType> {
    match value {
        "client_to_espocrm" => Ok(SyncType::ClientToEspocrm),
        "espocrm_to_client" => Ok(SyncType::EspocrmToClient),
        "webhook" => Ok(SyncType::Webhook),
        other => Err(AppError::Validation(format!("Unknown sync type '{other}'"))),
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": error,
        })),
    )
        .into_response()
}
