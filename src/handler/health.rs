use chrono::{SecondsFormat, Utc};
use hyper::StatusCode;
use serde_json::Value;

use crate::models::response::{BackendHealthResponse, HealthResponse};

use super::{json_response, AppState, GatewayResponse};

pub fn health(state: &AppState) -> GatewayResponse {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "OK".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime: state.started_at.elapsed().as_secs_f64(),
        },
    )
}

/// Unauthenticated check of the backend through its model listing.
pub async fn backend_health(state: &AppState) -> GatewayResponse {
    let backend = state.upstream.config().base_url.clone();
    match state.upstream.list_models().await {
        Ok(tags) => {
            let models = tags
                .get("models")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            json_response(
                StatusCode::OK,
                &BackendHealthResponse {
                    status: "OK".to_string(),
                    backend,
                    models: Some(models),
                    message: None,
                },
            )
        }
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &BackendHealthResponse {
                status: "ERROR".to_string(),
                backend,
                models: None,
                message: Some(e.to_string()),
            },
        ),
    }
}
