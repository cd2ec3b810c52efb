//! Session endpoints
//!
//! A thin adapter turning HTTP calls into `ChatClient` operations. The
//! session mutex doubles as the busy gate: while any handler holds it,
//! mutating calls answer 409 and `GET /api/session` only reports
//! `{"busy": true}`, since the holder may be a send, a load or a new chat.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::config::prompts_builtin;
use crate::conversation::Message;
use crate::core::{ChatError, ChatState};

use super::{ApiError, AppState};

#[derive(Debug, Default, Serialize)]
struct SessionResponse {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    busy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<ChatState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<Message>>,
}

#[derive(Debug, Deserialize)]
struct CredentialRequest {
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CredentialResponse {
    state: ChatState,
    notice: &'static str,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    message: Message,
    replied: bool,
    state: ChatState,
}

#[derive(Debug, Serialize)]
struct NewChatResponse {
    greeting: String,
}

#[derive(Debug, Serialize)]
struct HistoryItem {
    index: usize,
    title: String,
}

#[derive(Debug, Serialize)]
struct ConversationResponse {
    title: String,
    messages: Vec<Message>,
}

fn busy() -> ApiError {
    ApiError::from(ChatError::Busy)
}

async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let Ok(session) = state.session.try_lock() else {
        return Json(SessionResponse {
            busy: true,
            ..Default::default()
        });
    };

    Json(SessionResponse {
        busy: false,
        state: Some(session.state()),
        title: Some(session.title()),
        messages: Some(session.conversation().messages().to_vec()),
    })
}

async fn set_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, ApiError> {
    let mut session = state.session.try_lock().map_err(|_| busy())?;
    let chat_state = session.configure(&request.api_key).await?;

    Ok(Json(CredentialResponse {
        state: chat_state,
        notice: prompts_builtin::CREDENTIAL_SAVED,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let mut session = state
        .session
        .clone()
        .try_lock_owned()
        .map_err(|_| busy())?;

    // Run to completion even if the caller goes away
    let task = tokio::spawn(async move {
        let outcome = session.send(&request.text).await;
        (outcome, session.state())
    });

    let (outcome, chat_state) = task
        .await
        .map_err(|e| ApiError::internal(format!("send task failed: {}", e)))?;
    let outcome = outcome?;

    Ok(Json(SendResponse {
        message: outcome.message,
        replied: outcome.replied,
        state: chat_state,
    }))
}

async fn new_chat(State(state): State<AppState>) -> Result<Json<NewChatResponse>, ApiError> {
    let mut session = state.session.try_lock().map_err(|_| busy())?;
    let greeting = session.new_chat().await.to_string();

    Ok(Json(NewChatResponse { greeting }))
}

async fn list_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryItem>>, ApiError> {
    let session = state.session.try_lock().map_err(|_| busy())?;
    let placeholder = session.prompts().empty_title.clone();

    let items = session
        .history()
        .list_with(&placeholder)
        .map(|(index, title)| HistoryItem { index, title })
        .collect();

    Ok(Json(items))
}

async fn load_chat(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let mut session = state.session.try_lock().map_err(|_| busy())?;
    let messages = session.load_chat(index).await?.messages().to_vec();

    Ok(Json(ConversationResponse {
        title: session.title(),
        messages,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/credential", put(set_credential))
        .route("/api/session/messages", post(send_message))
        .route("/api/session/new", post(new_chat))
        .route("/api/history", get(list_history))
        .route("/api/history/:index/load", post(load_chat))
}
