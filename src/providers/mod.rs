//! Remote chat-completion API

pub mod openai_compat;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::conversation::{Conversation, Message};

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The API answered with an `error.message`
    #[error("API error: {message}")]
    Api { status: StatusCode, message: String },

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the API rejected the credential
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ProviderError::Api { status, message } => {
                *status == StatusCode::UNAUTHORIZED
                    || message.to_lowercase().contains("authentication")
            }
            ProviderError::Status { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    /// Forwarded as-is, so the proxy does not reshape caller messages
    pub messages: Vec<Value>,
    pub temperature: f32,
}

impl ChatCompletionRequest {
    /// `[system, ...conversation]`
    pub fn from_conversation(
        model: &str,
        temperature: f32,
        system_prompt: &str,
        conversation: &Conversation,
    ) -> Self {
        let messages = std::iter::once(Message::system(system_prompt))
            .chain(conversation.messages().iter().cloned())
            .map(|m| json!(m))
            .collect();

        Self {
            model: model.to_string(),
            messages,
            temperature,
        }
    }
}

/// A chat-completion backend
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Send `request` authorized by `api_key`.
    ///
    /// Returns the raw response body when the API did not report an error.
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<Value, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}

/// Extract `choices[0].message.content` from a completion response
pub fn extract_reply(body: &Value) -> Result<String, ProviderError> {
    let completion = ChatCompletionResponse::deserialize(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))
}

/// Throwaway HTTP upstream for exercising the real client
#[cfg(test)]
pub(crate) mod test_upstream {
    use axum::Router;

    /// Serve `app` on an ephemeral local port and return its `/v1` base URL
    pub async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }
}
