//! Sync task message consumed by the background worker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of synchronization work.
///
/// Tasks are immutable once constructed, consumed exactly once by the
/// dispatch worker, and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sync_type", rename_all = "snake_case")]
pub enum SyncTask {
    /// Push one local client to EspoCRM.
    ClientToEspocrm { client_id: Uuid },
    /// Pull one remote Account into local storage.
    EspocrmToClient { espocrm_id: String },
    /// One full round: all local clients out, all remote accounts in.
    FullSync,
    /// Process a webhook payload received from EspoCRM.
    ///
    /// The signature header travels with the payload because verification
    /// happens at processing time, not at receive time.
    Webhook {
        payload: serde_json::Value,
        signature: Option<String>,
    },
}

impl SyncTask {
    pub fn for_client_to_espocrm(client_id: Uuid) -> Self {
        Self::ClientToEspocrm { client_id }
    }

    pub fn for_espocrm_to_client(espocrm_id: impl Into<String>) -> Self {
        Self::EspocrmToClient {
            espocrm_id: espocrm_id.into(),
        }
    }

    pub fn for_full_sync() -> Self {
        Self::FullSync
    }

    pub fn for_webhook(payload: serde_json::Value, signature: Option<String>) -> Self {
        Self::Webhook { payload, signature }
    }

    /// Short tag used in worker log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientToEspocrm { .. } => "client_to_espocrm",
            Self::EspocrmToClient { .. } => "espocrm_to_client",
            Self::FullSync => "full_sync",
            Self::Webhook { .. } => "webhook",
        }
    }
}
