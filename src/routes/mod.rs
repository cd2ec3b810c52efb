//! API routes

mod error;
mod proxy;
mod session;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::core::ChatClient;
use crate::providers::CompletionApi;

pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Completion API used by the proxy endpoint
    pub api: Arc<dyn CompletionApi>,
    /// The single chat session driven by the session endpoints
    pub session: Arc<Mutex<ChatClient>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(proxy::router())
        .merge(session::router())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = test_state(None, ScriptedApi::new(|_| Ok(json!({})))).await;

        let (status, body) = call(&state, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }
}
