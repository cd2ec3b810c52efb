//! Server-side completion proxy
//!
//! Forwards a caller's message list to the completion API with the server's
//! own credential, model and temperature. The credential never leaves the
//! server.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::providers::{ChatCompletionRequest, ProviderError};

use super::{ApiError, AppState};

const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    messages: Vec<Value>,
}

async fn proxy_chat(
    State(state): State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let Some(api_key) = state.config.openai_api_key.as_deref() else {
        tracing::error!("OPENAI_API_KEY is not set, cannot proxy chat request");
        return Err(ApiError::internal(INTERNAL_ERROR));
    };

    let request = ChatCompletionRequest {
        model: state.config.model.clone(),
        messages: payload.messages,
        temperature: state.config.temperature,
    };

    match state.api.complete(api_key, &request).await {
        Ok(body) => Ok(Json(body)),
        Err(ProviderError::Api { status, message }) => {
            tracing::warn!("Upstream rejected proxied request ({}): {}", status, message);
            Err(ApiError::bad_request(message))
        }
        Err(e) => {
            tracing::error!("Proxied chat request failed: {}", e);
            Err(ApiError::internal(INTERNAL_ERROR))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(proxy_chat))
}
