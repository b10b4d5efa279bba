//! Tests for the EspoCRM API client against an in-process fake server:
//! token caching, authentication failures and request error context.

mod common;

use std::sync::atomic::Ordering;

use serde_json::json;

use crm_bridge_backend::services::espocrm_client::{CrmClientError, EspoCrmClient};

use common::spawn_fake_crm;

#[tokio::test]
async fn token_is_reused_within_ttl() {
    let crm = spawn_fake_crm().await;
    let client = EspoCrmClient::new(&crm.base_url, "admin", "api-key").unwrap();

    let first = client.authenticate().await.unwrap();
    let second = client.authenticate().await.unwrap();
    assert_eq!(first, second);

    // Two authenticate calls within the one-hour TTL hit the endpoint once
    assert_eq!(crm.state.auth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn requests_share_one_authentication() {
    let crm = spawn_fake_crm().await;
    let espocrm_id = crm.state.seed_account(json!({"name": "Reuse Corp"})).await;
    let client = EspoCrmClient::new(&crm.base_url, "admin", "api-key").unwrap();

    client.get(&format!("Account/{espocrm_id}")).await.unwrap();
    client.get(&format!("Account/{espocrm_id}")).await.unwrap();

    assert_eq!(crm.state.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(crm.state.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn authentication_failure_carries_remote_message() {
    let crm = spawn_fake_crm().await;
    crm.state.reject_auth.store(true, Ordering::SeqCst);
    let client = EspoCrmClient::new(&crm.base_url, "admin", "wrong-key").unwrap();

    let err = client.authenticate().await.unwrap_err();
    match err {
        CrmClientError::Authentication(message) => {
            assert!(message.contains("Invalid credentials"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn request_failure_includes_method_and_endpoint() {
    let crm = spawn_fake_crm().await;
    let client = EspoCrmClient::new(&crm.base_url, "admin", "api-key").unwrap();

    let err = client.get("Account/nope").await.unwrap_err();
    match err {
        CrmClientError::Request {
            method,
            endpoint,
            message,
        } => {
            assert_eq!(method, "GET");
            assert_eq!(endpoint, "Account/nope");
            assert!(message.contains("404"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_and_update_roundtrip() {
    let crm = spawn_fake_crm().await;
    let client = EspoCrmClient::new(&crm.base_url, "admin", "api-key").unwrap();

    let created = client
        .post("Account", &json!({"name": "Roundtrip Corp"}))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    client
        .put(
            &format!("Account/{id}"),
            &json!({"name": "Roundtrip Corp v2"}),
        )
        .await
        .unwrap();

    let fetched = client.get(&format!("Account/{id}")).await.unwrap();
    assert_eq!(fetched["name"], "Roundtrip Corp v2");
}
