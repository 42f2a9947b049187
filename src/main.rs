//! Memori - cognitive assistant API
//!
//! A single-user conversational assistant that remembers who it is talking
//! to. Each message may update the stored profile, be answered from memory,
//! or go through a bounded tool-calling loop against the language model.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;
mod tools;

#[cfg(test)]
mod testing;

use config::{AssistantConfig, Config, LlmConfig};
use core::{ChatEngine, EngineSettings, MemorySettings, MemoryStore, ModelGateway, Summarizer};
use providers::{ModelProvider, OpenAICompatConfig, OpenAICompatProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_engine: Arc<ChatEngine>,
    pub store: Arc<MemoryStore>,
}

/// Provider for real model calls. In mock mode a provider that cannot be
/// built is `None` instead of an error.
fn live_provider(
    config: &Config,
    llm: &LlmConfig,
    use_mock: bool,
) -> anyhow::Result<Option<Arc<dyn ModelProvider>>> {
    match providers::from_config(config, llm) {
        Ok(provider) => Ok(Some(provider)),
        Err(e) if use_mock => {
            tracing::warn!(error = %e, "Mock mode enabled, the model will not be called");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memori=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let assistant = AssistantConfig::load(config.config_path.as_deref())?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let mut settings = EngineSettings::from(&assistant);
    settings.use_mock |= config.use_mock_llm;

    let live = live_provider(&config, &assistant.llm, settings.use_mock)?;
    // Mock mode without a provider gets a placeholder that is never called
    let provider: Arc<dyn ModelProvider> = match &live {
        Some(provider) => provider.clone(),
        None => Arc::new(OpenAICompatProvider::new(OpenAICompatConfig::default())?),
    };
    tracing::info!(provider = provider.name(), model = %assistant.llm.chat_model, "Model provider ready");

    // Initialize memory store
    let memory_settings = MemorySettings {
        k: assistant.memory.k,
        max_history_pairs: assistant.chat_history.max_history_pairs,
        max_characters: assistant.chat_history.max_characters,
    };
    let db_path = config.data_dir.join(&assistant.memory.db_path);
    let mut store = MemoryStore::new(&db_path, memory_settings).await?;
    match live {
        Some(provider) => {
            store = store.with_summarizer(Summarizer::new(provider, &assistant.llm.summary_model));
        }
        None => tracing::info!("No summary model, summaries use the local digest"),
    }
    let store = Arc::new(store);
    tracing::info!(path = %db_path.display(), "Memory store opened");

    let gateway = ModelGateway::new(
        provider,
        &assistant.llm.chat_model,
        &assistant.llm.fallback_model,
    )
    .with_temperature(assistant.llm.temperature);

    let chat_engine = Arc::new(ChatEngine::with_store(settings, gateway, store.clone()));

    let state = AppState {
        chat_engine,
        store,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🧠 Memori API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unknown_provider() -> LlmConfig {
        LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_mock_mode_without_provider() {
        let live = live_provider(&Config::default(), &unknown_provider(), true).unwrap();
        assert!(live.is_none());
    }

    #[test]
    fn test_missing_provider_fails_outside_mock_mode() {
        assert!(live_provider(&Config::default(), &unknown_provider(), false).is_err());
    }
}
