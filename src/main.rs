//! THB AI - bilingual chat assistant
//!
//! Serves a single chat session (live conversation, archived history and the
//! user's API key, all kept in a local SQLite store) plus a stateless
//! `/api/chat` proxy that calls the completion API with the server's key.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod history;
mod providers;
mod routes;
mod store;

use config::{Config, PromptTemplate, Prompts};
use crate::core::{ChatClient, ChatSettings};
use providers::{CompletionApi, OpenAICompatConfig, OpenAICompatProvider};
use routes::AppState;
use store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thb_ai=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let prompts = match &config.persona_file {
        Some(path) => {
            let template = PromptTemplate::load(path)
                .await
                .with_context(|| format!("loading persona file {}", path.display()))?;
            tracing::info!("Using persona '{}'", template.persona.name);
            Prompts::from(template)
        }
        None => Prompts::default(),
    };

    let store = Arc::new(
        SqliteStore::new(&config.db_path())
            .await
            .context("opening local store")?,
    );

    let api: Arc<dyn CompletionApi> = Arc::new(OpenAICompatProvider::new(
        OpenAICompatConfig::new(config.openai_base_url.clone(), config.timeout_secs),
    )?);

    let session = ChatClient::open(
        store,
        api.clone(),
        ChatSettings::from_config(&config, prompts),
    )
    .await;
    tracing::info!(
        "Session ready: state={:?}, {} archived chat(s)",
        session.state(),
        session.history().len()
    );

    if config.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, /api/chat will answer 500");
    }

    let state = AppState {
        config: Arc::new(config),
        api,
        session: Arc::new(Mutex::new(session)),
    };

    let app = routes::router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("THB AI server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
