//! EspoCRM connection configuration entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which way data is allowed to flow between the local system and EspoCRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Bidirectional,
    UnidirectionalOut,
    UnidirectionalIn,
}

/// EspoCRM connection configuration.
///
/// At most one row may have `is_active = true` at any time; the create
/// handler enforces this, not a database constraint. API responses use a
/// dedicated shape so the key and webhook secret never leave the server.
#[derive(Clone, FromRow)]
pub struct EspoCrmConfig {
    pub id: Uuid,
    pub api_url: String,
    pub api_key: String,
    pub username: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub is_active: bool,
    pub sync_enabled: bool,
    pub webhook_enabled: bool,
    pub sync_direction: SyncDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

redacted_debug!(EspoCrmConfig {
    show id,
    show api_url,
    redact api_key,
    show username,
    show webhook_url,
    redact_option webhook_secret,
    show is_active,
    show sync_enabled,
    show webhook_enabled,
    show sync_direction,
});

impl EspoCrmConfig {
    /// Create a new active configuration with sync and webhooks enabled.
    pub fn new(
        api_url: impl AsRef<str>,
        api_key: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_url: api_url.as_ref().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            username: username.into(),
            webhook_url: None,
            webhook_secret: None,
            is_active: true,
            sync_enabled: true,
            webhook_enabled: true,
            sync_direction: SyncDirection::Bidirectional,
            created_at: Utc::now(),
            updated_at: None,
            last_sync_at: None,
        }
    }

    /// Replace the API URL, stripping any trailing slashes.
    pub fn set_api_url(&mut self, api_url: &str) {
        self.api_url = api_url.trim_end_matches('/').to_string();
    }

    /// True when local changes may be pushed to EspoCRM.
    pub fn outbound_sync_enabled(&self) -> bool {
        self.sync_enabled
            && matches!(
                self.sync_direction,
                SyncDirection::Bidirectional | SyncDirection::UnidirectionalOut
            )
    }

    /// True when remote changes may be pulled into local storage.
    pub fn inbound_sync_enabled(&self) -> bool {
        self.sync_enabled
            && matches!(
                self.sync_direction,
                SyncDirection::Bidirectional | SyncDirection::UnidirectionalIn
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_strips_trailing_slash() {
        let config = EspoCrmConfig::new("https://crm.example.com/", "key", "admin");
        assert_eq!(config.api_url, "https://crm.example.com");

        let config = EspoCrmConfig::new("https://crm.example.com///", "key", "admin");
        assert_eq!(config.api_url, "https://crm.example.com");
    }

    #[test]
    fn test_new_config_defaults() {
        let config = EspoCrmConfig::new("https://crm.example.com", "key", "admin");
        assert!(config.is_active);
        assert!(config.sync_enabled);
        assert!(config.webhook_enabled);
        assert_eq!(config.sync_direction, SyncDirection::Bidirectional);
        assert!(config.last_sync_at.is_none());
    }

    #[test]
    fn test_direction_predicates() {
        let mut config = EspoCrmConfig::new("https://crm.example.com", "key", "admin");

        config.sync_direction = SyncDirection::Bidirectional;
        assert!(config.outbound_sync_enabled());
        assert!(config.inbound_sync_enabled());

        config.sync_direction = SyncDirection::UnidirectionalOut;
        assert!(config.outbound_sync_enabled());
        assert!(!config.inbound_sync_enabled());

        config.sync_direction = SyncDirection::UnidirectionalIn;
        assert!(!config.outbound_sync_enabled());
        assert!(config.inbound_sync_enabled());
    }

    #[test]
    fn test_sync_disabled_overrides_direction() {
        let mut config = EspoCrmConfig::new("https://crm.example.com", "key", "admin");
        config.sync_enabled = false;
        assert!(!config.outbound_sync_enabled());
        assert!(!config.inbound_sync_enabled());
    }

    #[test]
    fn test_direction_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&SyncDirection::UnidirectionalOut).unwrap(),
            "\"unidirectional_out\""
        );
        let direction: SyncDirection = serde_json::from_str("\"bidirectional\"").unwrap();
        assert_eq!(direction, SyncDirection::Bidirectional);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = EspoCrmConfig::new("https://crm.example.com", "s3cr3t-key", "admin");
        config.webhook_secret = Some("s3cr3t-webhook".into());
        let output = format!("{:?}", config);
        assert!(!output.contains("s3cr3t-key"));
        assert!(!output.contains("s3cr3t-webhook"));
        assert!(output.contains("[REDACTED]"));
    }
}
