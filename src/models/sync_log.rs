//! Synchronization audit log entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which synchronization flow produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    ClientToEspocrm,
    EspocrmToClient,
    Webhook,
}

/// Outcome of a synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Pending,
    Success,
    Error,
}

/// Append-only audit record of one synchronization attempt.
///
/// `completed_at` and `duration_ms` stay unset until `mark_completed` or
/// `mark_failed` runs; the record is write-once after completion.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct SyncLog {
    pub id: Uuid,
    pub sync_type: SyncType,
    pub status: SyncOutcome,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub espocrm_id: Option<String>,
    pub message: Option<String>,
    #[schema(value_type = Object)]
    pub data: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl SyncLog {
    /// Start a new log record; `created_at` is stamped now.
    pub fn begin(sync_type: SyncType) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_type,
            status: SyncOutcome::Pending,
            entity_type: None,
            entity_id: None,
            espocrm_id: None,
            message: None,
            data: None,
            error_details: None,
            created_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
        }
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn espocrm_id(mut self, espocrm_id: impl Into<String>) -> Self {
        self.espocrm_id = Some(espocrm_id.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Complete the record with the given outcome.
    ///
    /// Duration is whole elapsed seconds times 1000, computed from
    /// `created_at`.
    pub fn mark_completed(&mut self, status: SyncOutcome, message: impl Into<String>) {
        let now = Utc::now();
        self.status = status;
        self.message = Some(message.into());
        self.completed_at = Some(now);
        self.duration_ms = (now - self.created_at).num_seconds() * 1000;
    }

    /// Complete the record as failed, keeping structured error details.
    pub fn mark_failed(&mut self, message: impl Into<String>, details: Option<serde_json::Value>) {
        let message = message.into();
        self.error_details =
            details.or_else(|| Some(serde_json::json!({ "exception": message.clone() })));
        self.mark_completed(SyncOutcome::Error, message);
    }
}
