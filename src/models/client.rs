//! Client entity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Local business client.
///
/// `espocrm_id` is the join key to the remote CRM Account record. `None`
/// means the client has not been created remotely yet; outbound sync routes
/// on its presence (update) or absence (create).
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Client {
    pub id: Uuid,
    pub company_name: String,
    pub siret: Option<String>,
    pub vat_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub espocrm_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Client {
    /// Create a new client with the given company name.
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_name: company_name.into(),
            siret: None,
            vat_number: None,
            phone: None,
            email: None,
            address: None,
            postal_code: None,
            city: None,
            country: None,
            status: "active".to_string(),
            notes: None,
            espocrm_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_defaults() {
        let client = Client::new("Acme SARL");
        assert_eq!(client.company_name, "Acme SARL");
        assert_eq!(client.status, "active");
        assert!(client.espocrm_id.is_none());
        assert!(client.updated_at.is_none());
    }
}
