//! Common test utilities: in-memory store wiring and an in-process fake
//! EspoCRM server with call counters.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crm_bridge_backend::models::{EspoCrmConfig, SyncDirection};
use crm_bridge_backend::services::sync_service::SyncService;
use crm_bridge_backend::store::memory::MemoryStore;
use crm_bridge_backend::store::SyncStore;

/// Build a service over a fresh in-memory store, returning both handles.
pub fn service_with_memory_store() -> (Arc<MemoryStore>, Arc<SyncService>) {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(SyncService::new(store.clone() as Arc<dyn SyncStore>));
    (store, service)
}

/// Build an active configuration pointing at the given base URL.
pub fn test_config(base_url: &str, direction: SyncDirection) -> EspoCrmConfig {
    let mut config = EspoCrmConfig::new(base_url, "test-api-key", "admin");
    config.sync_direction = direction;
    config
}

/// Shared state of the fake EspoCRM server.
pub struct CrmState {
    pub auth_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub reject_auth: AtomicBool,
    /// Account name that makes create/update fail with HTTP 500.
    pub fail_name: RwLock<Option<String>>,
    pub accounts: RwLock<BTreeMap<String, Value>>,
    next_id: AtomicUsize,
}

impl CrmState {
    fn new() -> Self {
        Self {
            auth_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            reject_auth: AtomicBool::new(false),
            fail_name: RwLock::new(None),
            accounts: RwLock::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn remote_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.get_calls.load(Ordering::SeqCst)
            + self.list_calls.load(Ordering::SeqCst)
    }

    /// Seed a remote account and return its id.
    pub async fn seed_account(&self, fields: Value) -> String {
        let id = format!("espo-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut account = fields;
        account["id"] = json!(id);
        self.accounts.write().await.insert(id.clone(), account);
        id
    }
}

/// Fake EspoCRM server bound to an ephemeral local port.
pub struct FakeCrm {
    pub base_url: String,
    pub state: Arc<CrmState>,
}

/// Spin up the fake server; it lives until the test runtime is dropped.
pub async fn spawn_fake_crm() -> FakeCrm {
    let state = Arc::new(CrmState::new());
    let app = Router::new()
        .route("/api/v1/accessToken", post(access_token))
        .route("/api/v1/Account", get(list_accounts).post(create_account))
        .route(
            "/api/v1/Account/:id",
            get(get_account).put(update_account),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake CRM listener");
    let addr = listener.local_addr().expect("fake CRM local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake CRM server");
    });

    FakeCrm {
        base_url: format!("http://{addr}"),
        state,
    }
}

async fn access_token(State(state): State<Arc<CrmState>>) -> impl IntoResponse {
    state.auth_calls.fetch_add(1, Ordering::SeqCst);
    if state.reject_auth.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid credentials"})),
        );
    }
    (StatusCode::OK, Json(json!({"token": "fake-token"})))
}

async fn create_account(
    State(state): State<Arc<CrmState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.create_calls.fetch_add(1, Ordering::SeqCst);
    if should_fail(&state, &payload).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "induced failure"})),
        );
    }
    let id = state.seed_account(payload).await;
    (StatusCode::OK, Json(json!({"id": id})))
}

async fn update_account(
    State(state): State<Arc<CrmState>>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.update_calls.fetch_add(1, Ordering::SeqCst);
    if should_fail(&state, &payload).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "induced failure"})),
        );
    }
    let mut account = payload;
    account["id"] = json!(id);
    state.accounts.write().await.insert(id.clone(), account);
    (StatusCode::OK, Json(json!({"id": id})))
}

async fn get_account(
    State(state): State<Arc<CrmState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.get_calls.fetch_add(1, Ordering::SeqCst);
    match state.accounts.read().await.get(&id) {
        Some(account) => (StatusCode::OK, Json(account.clone())),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "maxSize")]
    max_size: Option<usize>,
    offset: Option<usize>,
}

async fn list_accounts(
    State(state): State<Arc<CrmState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    state.list_calls.fetch_add(1, Ordering::SeqCst);
    let accounts = state.accounts.read().await;
    let max_size = query.max_size.unwrap_or(200);
    let offset = query.offset.unwrap_or(0);
    let page: Vec<Value> = accounts
        .values()
        .skip(offset)
        .take(max_size)
        .cloned()
        .collect();
    Json(json!({"list": page, "total": accounts.len()}))
}

async fn should_fail(state: &CrmState, payload: &Value) -> bool {
    let fail_name = state.fail_name.read().await;
    match (fail_name.as_deref(), payload.get("name").and_then(Value::as_str)) {
        (Some(fail), Some(name)) => fail == name,
        _ => false,
    }
}
