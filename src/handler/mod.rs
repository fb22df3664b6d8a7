use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::ollama::{UpstreamClient, UpstreamError};
use crate::config::GatewayConfig;
use crate::error::ApiError;

pub mod auth;
pub mod completions;
pub mod health;
pub mod models;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

pub type GatewayResponse = Response<Full<Bytes>>;

/// Shared, read-only state handed to every request.
pub struct AppState {
    pub config: GatewayConfig,
    pub upstream: UpstreamClient,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig, upstream: UpstreamClient) -> Self {
        AppState {
            config,
            upstream,
            started_at: Instant::now(),
        }
    }
}

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<GatewayResponse, Infallible> {
    let request_id = Uuid::new_v4();
    let (parts, body) = req.into_parts();
    info!(
        "Received request {}: {} {}",
        request_id,
        parts.method,
        parts.uri.path()
    );

    let response = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => {
            route(
                &state,
                &parts.method,
                parts.uri.path(),
                &parts.headers,
                collected.to_bytes(),
            )
            .await
        }
        Err(e) => {
            let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                ApiError::PayloadTooLarge(MAX_BODY_BYTES)
            } else {
                ApiError::Unhandled(format!("failed to read request body: {}", e))
            };
            error_response(&state, err)
        }
    };
    Ok(with_common_headers(response, request_id))
}

/// Dispatches a fully-read request. Everything under `/api` requires a credential.
pub async fn route(
    state: &Arc<AppState>,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> GatewayResponse {
    let result = match (method, path) {
        (&Method::OPTIONS, _) => Ok(empty_response(StatusCode::NO_CONTENT)),
        (&Method::GET, "/health") => Ok(health::health(state)),
        (&Method::GET, "/health/ollama") => Ok(health::backend_health(state).await),
        (_, path) if path == "/api" || path.starts_with("/api/") => {
            protected(state, method, path, headers, body).await
        }
        _ => Err(ApiError::NotFound(path.to_string())),
    };
    result.unwrap_or_else(|err| error_response(state, err))
}

async fn protected(
    state: &Arc<AppState>,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<GatewayResponse, ApiError> {
    auth::authenticate(headers, state.config.api_key.as_deref()).into_result()?;

    match (method, path) {
        (&Method::POST, "/api/chat") => completions::chat(state, &body).await,
        (&Method::POST, "/api/generate") => completions::generate(state, &body).await,
        (&Method::GET, "/api/models") => models::list(state).await,
        _ => Err(ApiError::NotFound(path.to_string())),
    }
}

/// Runs an upstream call. Unless configured otherwise the call lives on its own
/// task, so a client hanging up does not abort work already sent to the backend.
pub async fn forward<F, Fut>(state: &AppState, call: F) -> Result<Value, ApiError>
where
    F: FnOnce(UpstreamClient) -> Fut,
    Fut: Future<Output = Result<Value, UpstreamError>> + Send + 'static,
{
    let pending = call(state.upstream.clone());
    if state.config.cancel_on_disconnect {
        return Ok(pending.await?);
    }
    match tokio::spawn(pending).await {
        Ok(result) => Ok(result?),
        Err(e) => Err(ApiError::Unhandled(format!("upstream task failed: {}", e))),
    }
}

pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> GatewayResponse {
    match serde_json::to_vec(value) {
        Ok(body) => build_response(status, Bytes::from(body)),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(
                    br#"{"error":"Internal server error","message":"Something went wrong"}"#,
                ),
            )
        }
    }
}

fn build_response(status: StatusCode, body: Bytes) -> GatewayResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn empty_response(status: StatusCode) -> GatewayResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn error_response(state: &AppState, err: ApiError) -> GatewayResponse {
    let status = err.status();
    if status.is_server_error() {
        error!("Request failed ({}): {}", status, err);
    } else {
        warn!("Request rejected ({}): {}", status, err);
    }
    json_response(status, &err.to_body(state.config.is_development()))
}

fn with_common_headers(mut response: GatewayResponse, request_id: Uuid) -> GatewayResponse {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, x-api-key, authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}
