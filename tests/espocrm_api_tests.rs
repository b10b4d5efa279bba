//! Handler-level tests for the EspoCRM admin surface and webhook receiver,
//! driven through the router with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

use crm_bridge_backend::api::{routes::create_router, AppState};
use crm_bridge_backend::config::Config;
use crm_bridge_backend::models::{SyncLog, SyncOutcome, SyncTask, SyncType};
use crm_bridge_backend::services::sync_worker::sync_channel;
use crm_bridge_backend::store::SyncStore;

use common::{service_with_memory_store, test_config};

/// Build a router over the in-memory store. The receiver half of the task
/// channel is returned so tests can observe dispatched tasks.
fn test_app() -> (
    axum::Router,
    Arc<crm_bridge_backend::store::memory::MemoryStore>,
    UnboundedReceiver<SyncTask>,
) {
    let (store, service) = service_with_memory_store();
    let (dispatcher, rx) = sync_channel();
    let config = Config {
        database_url: "postgresql://unused".into(),
        bind_address: "127.0.0.1:0".into(),
        log_level: "error".into(),
        sync_max_retries: 0,
        sync_retry_delay_ms: 1,
    };
    let state = Arc::new(AppState::new(
        config,
        store.clone() as Arc<dyn SyncStore>,
        service,
        dispatcher,
    ));
    (create_router(state), store, rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn webhook_rejects_malformed_body() {
    let (app, _store, _rx) = test_app();

    let req = Request::builder()
        .method("POST")
        .uri("/api/espocrm/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_queues_task_with_signature() {
    let (app, _store, mut rx) = test_app();

    let payload = json!({"entityType": "Account", "entityId": "abc", "action": "update"});
    let req = Request::builder()
        .method("POST")
        .uri("/api/espocrm/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Espocrm-Signature", "deadbeef")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    match rx.try_recv().unwrap() {
        SyncTask::Webhook {
            payload: queued,
            signature,
        } => {
            assert_eq!(queued, payload);
            assert_eq!(signature.as_deref(), Some("deadbeef"));
        }
        other => panic!("unexpected task queued: {other:?}"),
    }
}

#[tokio::test]
async fn config_lifecycle_over_the_api() {
    let (app, _store, _rx) = test_app();

    // No configuration yet
    let resp = app
        .clone()
        .oneshot(Request::get("/api/espocrm/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Create
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/espocrm/config",
            json!({
                "api_url": "https://crm.example.com/",
                "api_key": "secret-key",
                "username": "admin",
                "webhook_secret": "hook-secret"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = response_json(resp).await;
    assert_eq!(body["success"], true);
    let config_id = body["config_id"].as_str().unwrap().to_string();

    // A second active configuration is rejected
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/espocrm/config",
            json!({
                "api_url": "https://other.example.com",
                "api_key": "other-key",
                "username": "other"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Read back: secrets never leave the server
    let resp = app
        .clone()
        .oneshot(Request::get("/api/espocrm/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["config"]["api_url"], "https://crm.example.com");
    assert!(body["config"].get("api_key").is_none());
    assert!(body["config"].get("webhook_secret").is_none());

    // Partial update
    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/espocrm/config/{config_id}"),
            json!({"sync_direction": "unidirectional_in"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/api/espocrm/config").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response_json(resp).await;
    assert_eq!(body["config"]["sync_direction"], "unidirectional_in");
}

#[tokio::test]
async fn create_config_validates_required_fields() {
    let (app, _store, _rx) = test_app();

    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/espocrm/config",
            json!({"api_url": "", "api_key": "key", "username": "admin"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = response_json(resp).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn full_sync_requires_active_config() {
    let (app, _store, _rx) = test_app();

    let resp = app
        .oneshot(json_request("POST", "/api/espocrm/sync/full", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = response_json(resp).await;
    assert_eq!(body["code"], "CONFIG_MISSING");
}

#[tokio::test]
async fn full_sync_defaults_to_async_dispatch() {
    let (app, store, mut rx) = test_app();
    store
        .save_config(&test_config(
            "https://crm.example.com",
            crm_bridge_backend::models::SyncDirection::Bidirectional,
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(json_request("POST", "/api/espocrm/sync/full", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rx.try_recv().unwrap(), SyncTask::FullSync);
}

#[tokio::test]
async fn sync_client_returns_404_for_unknown_client() {
    let (app, store, _rx) = test_app();
    store
        .save_config(&test_config(
            "https://crm.example.com",
            crm_bridge_backend::models::SyncDirection::Bidirectional,
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(json_request(
            "POST",
            &format!("/api/espocrm/sync/client/{}", uuid::Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_endpoint_reports_counts() {
    let (app, store, _rx) = test_app();

    let mut log = SyncLog::begin(SyncType::Webhook);
    log.mark_completed(SyncOutcome::Success, "done");
    store.insert_sync_log(&log).await.unwrap();

    let resp = app
        .oneshot(
            Request::get("/api/espocrm/sync/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["total_syncs"], 1);
    assert_eq!(body["stats"]["success_rate"], 100.0);
    assert_eq!(body["stats"]["config_active"], false);
}

#[tokio::test]
async fn logs_endpoint_paginates_and_filters() {
    let (app, store, _rx) = test_app();

    for i in 0..3 {
        let mut log = SyncLog::begin(SyncType::ClientToEspocrm);
        if i == 0 {
            log.mark_failed("boom", None);
        } else {
            log.mark_completed(SyncOutcome::Success, "ok");
        }
        store.insert_sync_log(&log).await.unwrap();
    }

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/espocrm/logs?page=1&limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["pages"], 2);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/espocrm/logs?status=error")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(resp).await;
    assert_eq!(body["pagination"]["total"], 1);

    // Unknown filter values are rejected
    let resp = app
        .oneshot(
            Request::get("/api/espocrm/logs?status=bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_is_healthy_with_memory_store() {
    let (app, _store, _rx) = test_app();

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = response_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "healthy");
}
