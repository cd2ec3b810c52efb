//! Chat client session
//!
//! The ChatClient owns everything one user session needs:
//! 1. The live conversation and the archived history
//! 2. The completion API credential and the Disabled/Idle/Sending state
//! 3. The store and API capabilities it was opened with
//!
//! Every operation is an explicit method call; adapters (HTTP routes, tests)
//! drive it and render the results.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::{Config, Prompts};
use crate::conversation::{Conversation, Message};
use crate::history::{HistoryError, HistoryManager};
use crate::providers::{extract_reply, ChatCompletionRequest, CompletionApi};
use crate::store::{get_as, PersistentStore, CREDENTIAL_KEY, CURRENT_CHAT_KEY};

/// Where the session is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    /// No usable credential; sending is refused
    Disabled,
    Idle,
    /// A request is in flight
    Sending,
}

/// Model parameters and persona for outgoing requests
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub prompts: Prompts,
}

impl ChatSettings {
    pub fn from_config(config: &Config, prompts: Prompts) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            prompts,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            prompts: Prompts::default(),
        }
    }
}

/// Result of a send that passed its preconditions
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    /// The assistant message appended to the conversation
    pub message: Message,

    /// `false` when `message` is the localized error text
    pub replied: bool,
}

/// Errors from the chat client
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("No API key configured")]
    Disabled,

    #[error("A message is already being sent")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("API key is empty")]
    EmptyCredential,

    #[error(transparent)]
    History(#[from] HistoryError),
}

pub struct ChatClient {
    store: Arc<dyn PersistentStore>,
    api: Arc<dyn CompletionApi>,
    settings: ChatSettings,
    credential: Option<String>,
    state: ChatState,
    conversation: Conversation,
    history: HistoryManager,
}

impl ChatClient {
    /// Restore a session from the store: credential, history and the last
    /// current chat. Unreadable values are dropped.
    pub async fn open(
        store: Arc<dyn PersistentStore>,
        api: Arc<dyn CompletionApi>,
        settings: ChatSettings,
    ) -> Self {
        let credential = match get_as::<String>(&*store, CREDENTIAL_KEY).await {
            Ok(key) => key.filter(|k| !k.trim().is_empty()),
            Err(e) => {
                tracing::warn!("Ignoring unreadable API key: {}", e);
                None
            }
        };

        let conversation = match get_as::<Conversation>(&*store, CURRENT_CHAT_KEY).await {
            Ok(Some(saved)) => saved.without_system(),
            Ok(None) => Conversation::new(),
            Err(e) => {
                tracing::warn!("Discarding unreadable current chat: {}", e);
                Conversation::new()
            }
        };

        let history = HistoryManager::load(store.clone()).await;

        let state = if credential.is_some() {
            ChatState::Idle
        } else {
            tracing::info!("No API key stored, chat is disabled until one is configured");
            ChatState::Disabled
        };

        Self {
            store,
            api,
            settings,
            credential,
            state,
            conversation,
            history,
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn prompts(&self) -> &Prompts {
        &self.settings.prompts
    }

    /// Title of the live conversation
    pub fn title(&self) -> String {
        self.conversation.title_or(&self.settings.prompts.empty_title)
    }

    /// Store a credential and enable sending
    pub async fn configure(&mut self, credential: &str) -> Result<ChatState, ChatError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ChatError::EmptyCredential);
        }

        if let Err(e) = self.store.set(CREDENTIAL_KEY, &json!(credential)).await {
            tracing::warn!("Failed to save API key, using it for this session only: {}", e);
        }

        self.credential = Some(credential.to_string());
        if self.state == ChatState::Disabled {
            self.state = ChatState::Idle;
        }
        tracing::info!("API key configured");
        Ok(self.state)
    }

    /// Send `text` as the next user message and append the assistant answer.
    ///
    /// Upstream failures do not produce an `Err`: they append the localized
    /// error message and, for rejected credentials, disable the session.
    /// The current chat is persisted after every attempt.
    ///
    /// Not cancel-safe: dropping the future mid-request leaves the session
    /// in `Sending`.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome, ChatError> {
        match self.state {
            ChatState::Disabled => return Err(ChatError::Disabled),
            ChatState::Sending => return Err(ChatError::Busy),
            ChatState::Idle => {}
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let Some(api_key) = self.credential.clone() else {
            self.state = ChatState::Disabled;
            return Err(ChatError::Disabled);
        };

        self.state = ChatState::Sending;
        self.conversation.add_user(text);

        let request = ChatCompletionRequest::from_conversation(
            &self.settings.model,
            self.settings.temperature,
            &self.settings.prompts.system_prompt,
            &self.conversation,
        );

        let result = match self.api.complete(&api_key, &request).await {
            Ok(body) => extract_reply(&body),
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(reply) => {
                let message = Message::assistant(reply);
                self.conversation.append(message.clone());
                self.state = ChatState::Idle;
                SendOutcome {
                    message,
                    replied: true,
                }
            }
            Err(e) => {
                tracing::error!("Chat request failed: {}", e);

                let message = Message::assistant(self.settings.prompts.error_message.clone());
                self.conversation.append(message.clone());

                self.state = if e.is_auth_failure() {
                    tracing::warn!("API key rejected, chat disabled until a new key is configured");
                    ChatState::Disabled
                } else {
                    ChatState::Idle
                };

                SendOutcome {
                    message,
                    replied: false,
                }
            }
        };

        self.persist_current().await;
        Ok(outcome)
    }

    /// Archive the current conversation (if any) and start an empty one.
    ///
    /// Returns the greeting to show at the top of the new chat.
    pub async fn new_chat(&mut self) -> &str {
        if self.history.archive(self.conversation.clone()).await {
            tracing::debug!("Archived chat, history now has {} entries", self.history.len());
        }
        self.conversation.clear();

        self.persist_current().await;
        &self.settings.prompts.greeting
    }

    /// Make history entry `index` the current conversation, archiving the
    /// current one first.
    pub async fn load_chat(&mut self, index: usize) -> Result<&Conversation, ChatError> {
        let len = self.history.len();
        if index >= len {
            return Err(HistoryError::OutOfRange { index, len }.into());
        }

        // Archiving appends, so `index` still points at the same entry
        let previous = std::mem::take(&mut self.conversation);
        self.history.archive(previous).await;

        self.conversation = self.history.take(index).await?;
        self.persist_current().await;
        Ok(&self.conversation)
    }

    async fn persist_current(&self) {
        let value = match serde_json::to_value(&self.conversation) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize current chat: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(CURRENT_CHAT_KEY, &value).await {
            tracing::warn!("Failed to save current chat: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::store::{SqliteStore, HISTORY_KEY};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Responder = Box<dyn Fn() -> Result<Value, ProviderError> + Send + Sync>;

    /// Completion API answering every request with `responder`
    struct FakeApi {
        responder: Responder,
        calls: AtomicUsize,
        last_request: Mutex<Option<(String, ChatCompletionRequest)>>,
    }

    impl FakeApi {
        fn new(responder: impl Fn() -> Result<Value, ProviderError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                responder: Box::new(responder),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn replying(text: &'static str) -> Arc<Self> {
            Self::new(move || Ok(json!({"choices": [{"message": {"role": "assistant", "content": text}}]})))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionApi for FakeApi {
        async fn complete(
            &self,
            api_key: &str,
            request: &ChatCompletionRequest,
        ) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some((api_key.to_string(), request.clone()));
            (self.responder)()
        }
    }

    async fn memory_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::in_memory().await.unwrap())
    }

    async fn configured_client(store: Arc<SqliteStore>, api: Arc<FakeApi>) -> ChatClient {
        let mut client = ChatClient::open(store, api, ChatSettings::default()).await;
        client.configure("sk-test").await.unwrap();
        client
    }

    fn error_message() -> String {
        Prompts::default().error_message
    }

    #[tokio::test]
    async fn test_send_without_credential_is_rejected() {
        let api = FakeApi::replying("never");
        let mut client = ChatClient::open(memory_store().await, api.clone(), ChatSettings::default()).await;

        assert_eq!(client.state(), ChatState::Disabled);
        assert!(matches!(client.send("hi").await, Err(ChatError::Disabled)));
        assert_eq!(api.calls(), 0);
        assert!(client.conversation().is_empty());
        assert_eq!(client.state(), ChatState::Disabled);
    }

    #[tokio::test]
    async fn test_send_success_appends_reply_and_persists() {
        let store = memory_store().await;
        let api = FakeApi::replying("Hi there");
        let mut client = configured_client(store.clone(), api.clone()).await;

        let outcome = client.send("  Hello \n").await.unwrap();
        assert!(outcome.replied);
        assert_eq!(outcome.message, Message::assistant("Hi there"));
        assert_eq!(client.state(), ChatState::Idle);

        let expected = Conversation::from(vec![Message::user("Hello"), Message::assistant("Hi there")]);
        assert_eq!(client.conversation(), &expected);

        let saved: Option<Conversation> = get_as(&*store, CURRENT_CHAT_KEY).await.unwrap();
        assert_eq!(saved, Some(expected));

        let (key, request) = api.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(key, "sk-test");
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0]["role"], "system");
        assert_eq!(request.messages[1], json!({"role": "user", "content": "Hello"}));
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let api = FakeApi::replying("never");
        let mut client = configured_client(memory_store().await, api.clone()).await;

        assert!(matches!(client.send("   ").await, Err(ChatError::EmptyMessage)));
        assert_eq!(api.calls(), 0);
        assert_eq!(client.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_auth_failure_disables_but_keeps_credential() {
        let store = memory_store().await;
        let api = FakeApi::new(|| {
            Err(ProviderError::Api {
                status: StatusCode::UNAUTHORIZED,
                message: "invalid_api_key: authentication failed".into(),
            })
        });
        let mut client = configured_client(store.clone(), api).await;

        let outcome = client.send("Hello").await.unwrap();
        assert!(!outcome.replied);
        assert_eq!(client.state(), ChatState::Disabled);

        let messages = client.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], Message::assistant(error_message()));

        let stored: Option<String> = get_as(&*store, CREDENTIAL_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some("sk-test"));

        assert!(matches!(client.send("again").await, Err(ChatError::Disabled)));
        assert_eq!(client.configure("sk-new").await.unwrap(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_other_failures_keep_session_usable() {
        let api = FakeApi::new(|| {
            Err(ProviderError::Api {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: "You exceeded your current quota".into(),
            })
        });
        let mut client = configured_client(memory_store().await, api).await;

        let outcome = client.send("Hello").await.unwrap();
        assert!(!outcome.replied);
        assert_eq!(outcome.message.content, error_message());
        assert_eq!(client.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_unexpected_response_shape_is_a_failure() {
        let api = FakeApi::new(|| Ok(json!({"unexpected": true})));
        let mut client = configured_client(memory_store().await, api).await;

        let outcome = client.send("Hello").await.unwrap();
        assert!(!outcome.replied);
        assert_eq!(client.state(), ChatState::Idle);
        assert_eq!(client.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_configure_rejects_blank_and_persists() {
        let store = memory_store().await;
        let mut client = ChatClient::open(store.clone(), FakeApi::replying("x"), ChatSettings::default()).await;

        assert!(matches!(client.configure("  ").await, Err(ChatError::EmptyCredential)));
        assert_eq!(client.state(), ChatState::Disabled);

        client.configure(" sk-abc ").await.unwrap();
        assert_eq!(client.state(), ChatState::Idle);

        let reopened = ChatClient::open(store, FakeApi::replying("x"), ChatSettings::default()).await;
        assert_eq!(reopened.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn test_new_chat_archives_non_empty_conversation() {
        let store = memory_store().await;
        let mut client = configured_client(store.clone(), FakeApi::replying("Hi there")).await;

        assert_eq!(client.new_chat().await, Prompts::default().greeting);
        assert!(client.history().is_empty());

        client.send("Hello").await.unwrap();
        client.new_chat().await;

        assert!(client.conversation().is_empty());
        assert_eq!(client.history().len(), 1);
        assert_eq!(client.history().list().next(), Some((0, "Hello".to_string())));

        let saved: Option<Vec<Conversation>> = get_as(&*store, HISTORY_KEY).await.unwrap();
        assert_eq!(saved.map(|h| h.len()), Some(1));
        let current: Option<Conversation> = get_as(&*store, CURRENT_CHAT_KEY).await.unwrap();
        assert_eq!(current, Some(Conversation::new()));
    }

    #[tokio::test]
    async fn test_load_chat_swaps_current_and_history() {
        let store = memory_store().await;
        let mut client = configured_client(store.clone(), FakeApi::replying("ok")).await;

        client.send("first").await.unwrap();
        client.new_chat().await;
        client.send("second").await.unwrap();
        client.new_chat().await;
        client.send("third").await.unwrap();

        let loaded = client.load_chat(0).await.unwrap();
        assert_eq!(loaded.messages()[0], Message::user("first"));

        let titles: Vec<String> = client.history().list().map(|(_, t)| t).collect();
        assert_eq!(titles, vec!["second", "third"]);

        let reopened = ChatClient::open(store, FakeApi::replying("ok"), ChatSettings::default()).await;
        assert_eq!(reopened.history().len(), 2);
        assert_eq!(reopened.conversation().messages()[0], Message::user("first"));
    }

    #[tokio::test]
    async fn test_load_chat_out_of_range_changes_nothing() {
        let mut client = configured_client(memory_store().await, FakeApi::replying("ok")).await;
        client.send("current").await.unwrap();

        let err = client.load_chat(0).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::History(HistoryError::OutOfRange { index: 0, len: 0 })
        ));
        assert_eq!(client.conversation().len(), 2);
        assert!(client.history().is_empty());
    }

    #[tokio::test]
    async fn test_open_drops_system_messages_from_saved_chat() {
        let store = memory_store().await;
        store
            .set(
                CURRENT_CHAT_KEY,
                &json!([
                    {"role": "system", "content": "leaked"},
                    {"role": "user", "content": "Hello"}
                ]),
            )
            .await
            .unwrap();

        let client = ChatClient::open(store, FakeApi::replying("x"), ChatSettings::default()).await;
        assert_eq!(client.conversation(), &Conversation::from(vec![Message::user("Hello")]));
        assert_eq!(client.title(), "Hello");
    }

    #[tokio::test]
    async fn test_load_chat_never_promotes_system_messages() {
        let store = memory_store().await;
        store
            .set(
                HISTORY_KEY,
                &json!([[
                    {"role": "system", "content": "leaked"},
                    {"role": "user", "content": "Hi"}
                ]]),
            )
            .await
            .unwrap();

        let api = FakeApi::replying("Hello again");
        let mut client = configured_client(store, api.clone()).await;
        assert_eq!(client.history().list().next(), Some((0, "Hi".to_string())));

        let loaded = client.load_chat(0).await.unwrap();
        assert_eq!(loaded, &Conversation::from(vec![Message::user("Hi")]));

        client.send("more").await.unwrap();
        let (_, request) = api.last_request.lock().unwrap().clone().unwrap();
        let system_count = request
            .messages
            .iter()
            .filter(|m| m["role"] == "system")
            .count();
        assert_eq!(system_count, 1);
    }
}
