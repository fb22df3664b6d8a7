//! In-process fake inference backend for tests.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::clients::ollama::UpstreamClient;
use crate::config::{GatewayConfig, UpstreamConfig};
use crate::handler::AppState;

pub const TEST_API_KEY: &str = "s3cret-key";

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with this status and JSON body.
    Json(StatusCode, Value),
    /// Reply 200 with a raw text body.
    Text(&'static str),
    /// Sleep before replying 200 `{}`.
    Hang(Duration),
    /// Accept the connection and drop it without answering.
    Close,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

pub struct FakeBackend {
    pub base_url: String,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().unwrap().clone()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn spawn_backend(behavior: Behavior) -> FakeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Mutex::new(Vec::new()));

    let log = recorded.clone();
    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if matches!(behavior, Behavior::Close) {
                drop(stream);
                continue;
            }
            let behavior = behavior.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| respond(req, behavior.clone(), log.clone()));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    FakeBackend {
        base_url: format!("http://{}", addr),
        recorded,
        task,
    }
}

async fn respond(
    req: Request<Incoming>,
    behavior: Behavior,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let bytes = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    log.lock().unwrap().push(RecordedRequest { method, path, body });

    let (status, payload) = match behavior {
        Behavior::Json(status, value) => (status, Bytes::from(value.to_string())),
        Behavior::Text(text) => (StatusCode::OK, Bytes::from_static(text.as_bytes())),
        Behavior::Hang(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, Bytes::from_static(b"{}"))
        }
        Behavior::Close => unreachable!("closed connections never reach the service"),
    };
    let mut response = Response::new(Full::new(payload));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// A local address with nothing listening on it.
pub async fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn upstream_config(base_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: base_url.to_string(),
        endpoint: "/api/chat".to_string(),
        default_model: "test-model".to_string(),
        timeout: Duration::from_secs(30),
        models_timeout: Duration::from_secs(10),
    }
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        upstream: upstream_config(base_url),
        api_key: Some(TEST_API_KEY.to_string()),
        environment: "production".to_string(),
        cancel_on_disconnect: false,
    }
}

pub fn app_state(config: GatewayConfig) -> Arc<AppState> {
    let upstream = UpstreamClient::new(config.upstream.clone()).unwrap();
    Arc::new(AppState::new(config, upstream))
}
