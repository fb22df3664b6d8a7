use anyhow::Error;
use bytes::Bytes;
use http::header;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::UpstreamConfig;
use crate::models::chat_request::{ChatRequest, GenerateRequest};
use crate::models::Message;

use super::error::{error_chain, UpstreamError};

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

/// HTTP client for the inference backend. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(UpstreamClient { http, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Sends one chat call and returns the backend body untouched.
    pub async fn chat(&self, request: &ChatRequest) -> Result<Value, UpstreamError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let payload = ChatPayload {
            model,
            messages: &request.messages,
            stream: request.stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        info!(
            "Making request to Ollama with model: {}, timeout: {}ms, temperature: {}, max_tokens: {}",
            model,
            self.config.timeout.as_millis(),
            request.temperature,
            request.max_tokens
        );

        let result = self.send_chat(&payload).await;
        if let Err(e) = &result {
            error!("Ollama API error ({}): {}", e.kind(), e);
        }
        result
    }

    async fn send_chat(&self, payload: &ChatPayload<'_>) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .post(self.config.chat_url())
            .header(header::ACCEPT, "application/json")
            .json(payload)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(&e, self.config.timeout))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_transport(&e, self.config.timeout))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }

        debug!("Ollama responded with {} bytes", body.len());
        Ok(relay_body(body))
    }

    /// Convenience for a single user prompt; never streams.
    pub async fn generate(&self, prompt: &str, model: Option<String>) -> Result<Value, UpstreamError> {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            model,
        }
        .into_chat_request();
        self.chat(&request).await
    }

    pub async fn list_models(&self) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(self.config.tags_url())
            .timeout(self.config.models_timeout)
            .send()
            .await
            .map_err(|e| fetch_models_error(error_chain(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_models_error(format!(
                "Request failed with status code {}",
                status.as_u16()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| fetch_models_error(error_chain(&e)))
    }
}

fn fetch_models_error(message: String) -> UpstreamError {
    error!("Error fetching models: {}", message);
    UpstreamError::FetchModels(message)
}

// Prefer the backend's own `error` field; fall back to a generic status line.
fn error_detail(status: StatusCode, body: &[u8]) -> String {
    let fallback = || format!("Request failed with status code {}", status.as_u16());
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("error") {
            Some(Value::String(message)) if !message.is_empty() => message.clone(),
            Some(Value::Null) | None => fallback(),
            Some(Value::String(_)) => fallback(),
            Some(other) => other.to_string(),
        },
        _ => fallback(),
    }
}

// Streamed replies are newline-delimited JSON, not one document; relay them as text.
fn relay_body(body: Bytes) -> Value {
    serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{refused_base_url, spawn_backend, upstream_config, Behavior};

    fn client_for(base_url: &str) -> UpstreamClient {
        UpstreamClient::new(upstream_config(base_url)).unwrap()
    }

    #[test]
    fn test_error_detail_prefers_backend_message() {
        assert_eq!(
            error_detail(StatusCode::NOT_FOUND, br#"{"error":"model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(
            error_detail(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>"),
            "Request failed with status code 502"
        );
        assert_eq!(
            error_detail(StatusCode::INTERNAL_SERVER_ERROR, br#"{"detail":"nope"}"#),
            "Request failed with status code 500"
        );
    }

    #[test]
    fn test_relay_body_keeps_non_json_as_text() {
        let ndjson = Bytes::from_static(b"{\"done\":false}\n{\"done\":true}\n");
        assert_eq!(
            relay_body(ndjson),
            Value::String("{\"done\":false}\n{\"done\":true}\n".to_string())
        );
        assert_eq!(relay_body(Bytes::from_static(br#"{"a":1}"#)), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_chat_forwards_payload_and_returns_body_verbatim() {
        let reply = json!({"model": "llama3.2", "message": {"role": "assistant", "content": "4"}, "done": true});
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, reply.clone())).await;
        let client = client_for(&backend.base_url);

        let request = ChatRequest::new(vec![
            Message::new("system", "be terse"),
            Message::user("What is 2+2?"),
        ])
        .with_model(Some("llama3.2".to_string()));
        let data = client.chat(&request).await.unwrap();
        assert_eq!(data, reply);

        let recorded = backend.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].path, "/api/chat");
        assert_eq!(
            recorded[0].body,
            json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "What is 2+2?"}
                ],
                "stream": false,
                "temperature": 0.7,
                "max_tokens": 512
            })
        );
    }

    #[tokio::test]
    async fn test_chat_uses_default_model() {
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, json!({}))).await;
        let client = client_for(&backend.base_url);
        client
            .chat(&ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(backend.requests()[0].body["model"], "test-model");
    }

    #[tokio::test]
    async fn test_generate_matches_single_message_chat() {
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, json!({"ok": true}))).await;
        let client = client_for(&backend.base_url);

        client.generate("What is 2+2?", None).await.unwrap();
        client
            .chat(&ChatRequest::new(vec![Message::user("What is 2+2?")]))
            .await
            .unwrap();

        let recorded = backend.requests();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].body, recorded[1].body);
    }

    #[tokio::test]
    async fn test_extra_message_fields_reach_the_backend() {
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, json!({}))).await;
        let client = client_for(&backend.base_url);
        let request = ChatRequest::from_json(
            br#"{"messages":[{"role":"user","content":"describe","images":["aGk="]}]}"#,
        )
        .unwrap();

        client.chat(&request).await.unwrap();
        assert_eq!(
            backend.requests()[0].body["messages"],
            json!([{"role": "user", "content": "describe", "images": ["aGk="]}])
        );
    }

    #[tokio::test]
    async fn test_generate_passes_explicit_model() {
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, json!({}))).await;
        let client = client_for(&backend.base_url);
        client
            .generate("What is 2+2?", Some("phi3".to_string()))
            .await
            .unwrap();
        let body = &backend.requests()[0].body;
        assert_eq!(body["model"], "phi3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"], json!([{"role": "user", "content": "What is 2+2?"}]));
    }

    #[tokio::test]
    async fn test_streamed_reply_is_relayed_as_text() {
        let backend = spawn_backend(Behavior::Text("{\"done\":false}\n{\"done\":true}\n")).await;
        let client = client_for(&backend.base_url);
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.stream = true;

        let data = client.chat(&request).await.unwrap();
        assert_eq!(data, Value::String("{\"done\":false}\n{\"done\":true}\n".to_string()));
        assert_eq!(backend.requests()[0].body["stream"], true);
    }

    #[tokio::test]
    async fn test_upstream_status_error_includes_backend_message() {
        let backend = spawn_backend(Behavior::Json(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "boom"}),
        ))
        .await;
        let client = client_for(&backend.base_url);

        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 500, .. }));
        let message = err.to_string();
        assert!(message.contains("boom"));
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_duration() {
        let backend = spawn_backend(Behavior::Hang(Duration::from_secs(5))).await;
        let mut config = upstream_config(&backend.base_url);
        config.timeout = Duration::from_millis(200);
        let client = UpstreamClient::new(config).unwrap();

        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { timeout_ms: 200 }));
        assert!(err.to_string().contains("200ms"));
    }

    #[tokio::test]
    async fn test_connection_refused_when_backend_is_down() {
        let client = client_for(&refused_base_url().await);
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::ConnectionRefused));
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_dropped_connection_is_a_network_error() {
        let backend = spawn_backend(Behavior::Close).await;
        let client = client_for(&backend.base_url);
        let err = client.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Network(_)));
        assert!(err.to_string().starts_with("Network Error: "));
    }

    #[tokio::test]
    async fn test_list_models() {
        let tags = json!({"models": [{"name": "llama3.2:latest"}]});
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, tags.clone())).await;
        let client = client_for(&backend.base_url);

        assert_eq!(client.list_models().await.unwrap(), tags);
        let recorded = backend.requests();
        assert_eq!(recorded[0].method, http::Method::GET);
        assert_eq!(recorded[0].path, "/api/tags");
    }

    #[tokio::test]
    async fn test_list_models_failures_collapse_into_one_kind() {
        let client = client_for(&refused_base_url().await);
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, UpstreamError::FetchModels(_)));
        assert!(err.to_string().starts_with("Failed to fetch models: "));

        let backend = spawn_backend(Behavior::Json(StatusCode::NOT_FOUND, json!({}))).await;
        let err = client_for(&backend.base_url).list_models().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch models: Request failed with status code 404"
        );
    }

    #[tokio::test]
    async fn test_repeated_requests_are_not_deduplicated() {
        let backend = spawn_backend(Behavior::Json(StatusCode::OK, json!({}))).await;
        let client = client_for(&backend.base_url);
        let request = ChatRequest::new(vec![Message::user("same")]);
        client.chat(&request).await.unwrap();
        client.chat(&request).await.unwrap();
        assert_eq!(backend.requests().len(), 2);
    }
}
