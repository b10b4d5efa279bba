//! Execution logic for the EspoCRM sync CLI command.

use std::process::ExitCode;
use std::sync::Arc;

use crate::cli::sync::{error, output, table_row, SyncArgs, SyncKind};
use crate::db;
use crate::error::AppError;
use crate::models::SyncTask;
use crate::services::sync_service::SyncService;
use crate::services::sync_worker::{spawn_sync_worker, sync_channel, WorkerRetryPolicy};
use crate::store::postgres::PgStore;

/// Run the sync CLI command
pub async fn run(args: SyncArgs) -> ExitCode {
    let database_url = match args
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(url) => url,
        None => {
            error(&args.format, "DATABASE_URL not set");
            return ExitCode::FAILURE;
        }
    };

    let pool = match db::create_pool(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error(&args.format, &format!("Database connection failed: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(SyncService::new(Arc::new(PgStore::new(pool))));

    match execute(&args, &service).await {
        Ok(code) => code,
        Err(e) => {
            error(&args.format, &format!("Sync failed: {e}"));
            ExitCode::FAILURE
        }
    }
}

async fn execute(
    args: &SyncArgs,
    service: &Arc<SyncService>,
) -> Result<ExitCode, AppError> {
    if args.test_connection {
        return test_connection(args, service).await;
    }
    if args.stats {
        return show_stats(args, service).await;
    }

    // Direct CLI invocation: a missing or inactive configuration is fatal
    service.require_active_config().await?;

    match args.kind {
        SyncKind::Full => full_sync(args, service).await,
        SyncKind::ClientToEspocrm => client_to_espocrm(args, service).await,
        SyncKind::EspocrmToClient => espocrm_to_client(args, service).await,
    }
}

async fn test_connection(
    args: &SyncArgs,
    service: &Arc<SyncService>,
) -> Result<ExitCode, AppError> {
    let report = service.test_connection().await?;
    if report.success {
        output(
            &args.format,
            &report.message,
            Some(serde_json::json!({
                "success": true,
                "message": report.message,
                "user_info": report.user_info,
            })),
        );
        Ok(ExitCode::SUCCESS)
    } else {
        error(&args.format, &report.message);
        Ok(ExitCode::FAILURE)
    }
}

async fn show_stats(args: &SyncArgs, service: &Arc<SyncService>) -> Result<ExitCode, AppError> {
    let stats = service.sync_stats().await?;

    if args.format == "json" {
        output(&args.format, "", Some(serde_json::to_value(&stats)?));
        return Ok(ExitCode::SUCCESS);
    }

    output(&args.format, "EspoCRM sync statistics", None);
    table_row(&["Total syncs", &stats.total_syncs.to_string()]);
    table_row(&["Successful", &stats.successful_syncs.to_string()]);
    table_row(&["Failed", &stats.failed_syncs.to_string()]);
    table_row(&["Success rate", &format!("{}%", stats.success_rate)]);
    table_row(&[
        "Last successful sync",
        &stats
            .last_successful_sync
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".into()),
    ]);
    table_row(&["Config active", &stats.config_active.to_string()]);
    Ok(ExitCode::SUCCESS)
}

async fn full_sync(args: &SyncArgs, service: &Arc<SyncService>) -> Result<ExitCode, AppError> {
    if args.async_mode {
        return run_through_worker(args, service, SyncTask::for_full_sync()).await;
    }

    output(&args.format, "Running full EspoCRM sync...", None);
    let report = service.full_sync().await?;

    output(&args.format, "Full sync finished", Some(serde_json::to_value(report)?));
    if args.format != "json" {
        table_row(&["Synced to EspoCRM", &report.synced_to_espocrm.to_string()]);
        table_row(&[
            "Synced from EspoCRM",
            &report.synced_from_espocrm.to_string(),
        ]);
        table_row(&["Errors", &report.errors.to_string()]);
    }
    Ok(ExitCode::SUCCESS)
}

async fn client_to_espocrm(
    args: &SyncArgs,
    service: &Arc<SyncService>,
) -> Result<ExitCode, AppError> {
    let client_id = args
        .client_id
        .ok_or_else(|| AppError::Validation("--client-id is required".into()))?;

    if args.async_mode {
        return run_through_worker(
            args,
            service,
            SyncTask::for_client_to_espocrm(client_id),
        )
        .await;
    }

    let mut client = service
        .store()
        .find_client(client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Client {client_id} not found")))?;

    if service.sync_client_to_espocrm(&mut client).await? {
        output(
            &args.format,
            &format!("Client {client_id} synced to EspoCRM"),
            None,
        );
        Ok(ExitCode::SUCCESS)
    } else {
        error(
            &args.format,
            &format!("Failed to sync client {client_id} to EspoCRM"),
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn espocrm_to_client(
    args: &SyncArgs,
    service: &Arc<SyncService>,
) -> Result<ExitCode, AppError> {
    let espocrm_id = args
        .espocrm_id
        .clone()
        .ok_or_else(|| AppError::Validation("--espocrm-id is required".into()))?;

    if args.async_mode {
        return run_through_worker(
            args,
            service,
            SyncTask::for_espocrm_to_client(espocrm_id),
        )
        .await;
    }

    match service.sync_client_from_espocrm(&espocrm_id).await? {
        Some(client) => {
            output(
                &args.format,
                &format!("Client {} synced from EspoCRM ({espocrm_id})", client.id),
                None,
            );
            Ok(ExitCode::SUCCESS)
        }
        None => {
            error(
                &args.format,
                &format!("Failed to sync client from EspoCRM (id: {espocrm_id})"),
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Run one task through a short-lived dispatch worker.
///
/// The CLI has no access to the server's queue, so async mode spins up its
/// own worker, enqueues the task and waits for the queue to drain.
async fn run_through_worker(
    args: &SyncArgs,
    service: &Arc<SyncService>,
    task: SyncTask,
) -> Result<ExitCode, AppError> {
    output(
        &args.format,
        &format!("Scheduling {} task through the sync worker...", task.kind()),
        None,
    );

    let (dispatcher, rx) = sync_channel();
    let worker = spawn_sync_worker(service.clone(), rx, WorkerRetryPolicy::default());
    dispatcher.dispatch(task)?;
    drop(dispatcher);

    worker
        .await
        .map_err(|e| AppError::Internal(format!("Sync worker panicked: {e}")))?;
    output(&args.format, "Task processed", None);
    Ok(ExitCode::SUCCESS)
}
