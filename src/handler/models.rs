use std::sync::Arc;

use hyper::StatusCode;

use crate::error::ApiError;
use crate::models::response::SuccessResponse;

use super::{forward, json_response, AppState, GatewayResponse};

pub async fn list(state: &Arc<AppState>) -> Result<GatewayResponse, ApiError> {
    let data = forward(state, |upstream| async move { upstream.list_models().await }).await?;
    Ok(json_response(StatusCode::OK, &SuccessResponse::new(data)))
}
