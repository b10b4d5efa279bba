//! Background sync worker and dispatch handle.
//!
//! Decouples request-time enqueue from execution-time processing. The
//! handler (`handle_task`) propagates every failure unmodified; the worker
//! loop around it applies the queue policy: exponential-backoff re-enqueue
//! up to a bounded attempt count, then a dead-letter log line.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::{AppError, Result};
use crate::models::SyncTask;
use crate::services::sync_service::SyncService;

/// Retry policy applied by the worker loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerRetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for WorkerRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
        }
    }
}

/// Cloneable handle used to enqueue sync tasks.
#[derive(Clone)]
pub struct SyncDispatcher {
    tx: mpsc::UnboundedSender<SyncTask>,
}

impl SyncDispatcher {
    /// Enqueue a task for out-of-band processing.
    pub fn dispatch(&self, task: SyncTask) -> Result<()> {
        tracing::debug!(kind = task.kind(), "Dispatching sync task");
        self.tx
            .send(task)
            .map_err(|_| AppError::Internal("Sync worker is not running".into()))
    }
}

/// Create the dispatch channel. The receiver half goes to
/// `spawn_sync_worker`.
pub fn sync_channel() -> (SyncDispatcher, mpsc::UnboundedReceiver<SyncTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SyncDispatcher { tx }, rx)
}

/// Spawn the background sync worker.
///
/// Runs until the dispatch side is dropped. Tasks are processed one at a
/// time in arrival order; no ordering is guaranteed across enqueues from
/// concurrent producers.
pub fn spawn_sync_worker(
    service: Arc<SyncService>,
    mut rx: mpsc::UnboundedReceiver<SyncTask>,
    policy: WorkerRetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Sync worker started");
        while let Some(task) = rx.recv().await {
            process_with_retry(&service, task, policy).await;
        }
        tracing::info!("Sync worker stopped");
    })
}

/// Run one task through the handler, re-running it with exponential
/// backoff on failure until the retry budget is spent.
async fn process_with_retry(service: &SyncService, task: SyncTask, policy: WorkerRetryPolicy) {
    let mut attempt = 0u32;
    let mut delay_ms = policy.initial_delay_ms;

    loop {
        match handle_task(service, &task).await {
            Ok(()) => {
                tracing::debug!(kind = task.kind(), attempt, "Sync task processed");
                return;
            }
            Err(e) if attempt < policy.max_retries => {
                tracing::warn!(
                    kind = task.kind(),
                    error = %e,
                    "Sync task failed, retrying in {}ms (attempt {}/{})",
                    delay_ms,
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
                delay_ms = delay_ms.saturating_mul(2);
            }
            Err(e) => {
                tracing::error!(
                    kind = task.kind(),
                    error = %e,
                    "Sync task dead-lettered after {} attempts",
                    attempt + 1
                );
                return;
            }
        }
    }
}

/// Execute one sync task against the engine.
///
/// Engine-level skip/failure results become errors here, and every error
/// propagates out unmodified — that is the retry trigger the surrounding
/// worker loop relies on.
pub async fn handle_task(service: &SyncService, task: &SyncTask) -> Result<()> {
    tracing::info!(kind = task.kind(), "Processing sync task");

    match task {
        SyncTask::ClientToEspocrm { client_id } => {
            let mut client = service
                .store()
                .find_client(*client_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Client {client_id} not found")))?;

            if !service.sync_client_to_espocrm(&mut client).await? {
                return Err(AppError::Internal(format!(
                    "Failed to sync client {client_id} to EspoCRM"
                )));
            }
            tracing::info!(client_id = %client_id, "Client synced to EspoCRM");
        }
        SyncTask::EspocrmToClient { espocrm_id } => {
            let client = service
                .sync_client_from_espocrm(espocrm_id)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Failed to sync client from EspoCRM (id: {espocrm_id})"
                    ))
                })?;
            tracing::info!(espocrm_id, client_id = %client.id, "Client synced from EspoCRM");
        }
        SyncTask::FullSync => {
            let report = service.full_sync().await?;
            tracing::info!(
                synced_to_espocrm = report.synced_to_espocrm,
                synced_from_espocrm = report.synced_from_espocrm,
                errors = report.errors,
                "Full sync task finished"
            );
        }
        SyncTask::Webhook { payload, signature } => {
            if !service.process_webhook(payload, signature.as_deref()).await? {
                return Err(AppError::Internal("Failed to process EspoCRM webhook".into()));
            }
            tracing::info!(
                entity_type = payload.get("entityType").and_then(|v| v.as_str()),
                action = payload.get("action").and_then(|v| v.as_str()),
                "Webhook processed"
            );
        }
    }
    Ok(())
}
