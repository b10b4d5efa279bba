//! EspoCRM webhook receiver.
//!
//! Accepts the raw webhook body, performs only JSON well-formedness
//! validation inline, and defers all processing (signature check included)
//! to the background worker. Responses are plain text per the remote
//! system's expectations.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::Value;
use utoipa::OpenApi;

use crate::api::SharedState;
use crate::models::SyncTask;

/// Header EspoCRM uses to carry the HMAC-SHA256 payload signature.
const SIGNATURE_HEADER: &str = "x-espocrm-signature";

#[derive(OpenApi)]
#[openapi(paths(receive_webhook))]
pub struct WebhookApiDoc;

/// Build the router for `/api/espocrm/webhook`.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(receive_webhook))
}

/// Receive a webhook notification from EspoCRM
#[utoipa::path(
    post,
    path = "/webhook",
    context_path = "/api/espocrm",
    tag = "espocrm",
    responses(
        (status = 200, description = "Webhook accepted for asynchronous processing"),
        (status = 400, description = "Malformed webhook body"),
        (status = 500, description = "Webhook could not be queued"),
    )
)]
pub async fn receive_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => {
            return (StatusCode::BAD_REQUEST, "Invalid webhook payload");
        }
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state
        .dispatcher
        .dispatch(SyncTask::for_webhook(payload, signature))
    {
        Ok(()) => (StatusCode::OK, "Webhook received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to queue webhook");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to queue webhook")
        }
    }
}
