use std::sync::Arc;

use bytes::Bytes;
use hyper::StatusCode;

use crate::error::ApiError;
use crate::models::chat_request::{ChatRequest, GenerateRequest};
use crate::models::response::SuccessResponse;

use super::{forward, json_response, AppState, GatewayResponse};

pub async fn chat(state: &Arc<AppState>, whole_body: &Bytes) -> Result<GatewayResponse, ApiError> {
    let request = ChatRequest::from_json(whole_body)?;
    let data = forward(state, |upstream| async move { upstream.chat(&request).await }).await?;
    Ok(json_response(StatusCode::OK, &SuccessResponse::new(data)))
}

pub async fn generate(
    state: &Arc<AppState>,
    whole_body: &Bytes,
) -> Result<GatewayResponse, ApiError> {
    let GenerateRequest { prompt, model } = GenerateRequest::from_json(whole_body)?;
    let data = forward(state, |upstream| async move {
        upstream.generate(&prompt, model).await
    })
    .await?;
    Ok(json_response(StatusCode::OK, &SuccessResponse::new(data)))
}
