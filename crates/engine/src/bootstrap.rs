//! Assembly Helpers
//!
//! Wires configuration into a runnable orchestrator: provider endpoints,
//! per-variant model overrides, the recommendation engine, and the store.
//! Host binaries call these once at startup.

use async_openai::config::OpenAIConfig;
use std::sync::Arc;
use tracing::info;

use mentor_core::agent::{AgentKind, AgentSet};
use mentor_core::llm::{LlmClient, OpenAiCompatibleClient};
use mentor_core::recommendation::{CourseCatalog, RecommendationEngine};

use crate::config::{Config, ConfigError, Provider};
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::store::{InteractionStore, MemoryStore, PgStore, StoreError};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
const GEMINI_COMPAT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

fn provider_config(config: &Config) -> Result<OpenAIConfig, ConfigError> {
    match config.provider {
        Provider::OpenAI => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
            Ok(OpenAIConfig::new()
                .with_api_key(api_key.as_str())
                .with_api_base(OPENAI_API_BASE))
        }
        Provider::Gemini => {
            let api_key = config
                .gemini_api_key
                .as_ref()
                .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
            Ok(OpenAIConfig::new()
                .with_api_key(api_key.as_str())
                .with_api_base(GEMINI_COMPAT_API_BASE))
        }
    }
}

/// Builds the agent registry: every variant on the configured default model,
/// with per-variant model overrides applied on top.
pub fn build_agent_set(config: &Config) -> Result<AgentSet, ConfigError> {
    let provider = provider_config(config)?;
    info!(provider = ?config.provider, model = %config.chat_model, "configuring agent capabilities");

    let default_client: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::new(
        provider.clone(),
        config.chat_model.clone(),
    ));
    let mut agents = AgentSet::new(default_client);

    for kind in AgentKind::ALL {
        if let Some(model) = config.model_overrides.get(&kind) {
            info!(agent_kind = %kind, model = %model, "applying model override");
            let client: Arc<dyn LlmClient> =
                Arc::new(OpenAiCompatibleClient::new(provider.clone(), model.clone()));
            agents = agents.with_client(kind, client);
        }
    }
    Ok(agents)
}

/// Chooses the store backend from configuration: PostgreSQL when
/// `DATABASE_URL` is set, the in-memory store otherwise.
pub async fn build_store(config: &Config) -> Result<Arc<dyn InteractionStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            info!("connecting PostgreSQL store");
            Ok(Arc::new(PgStore::connect(url).await?))
        }
        None => {
            info!("no DATABASE_URL set, running on the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Assembles an orchestrator from configuration plus the host-chosen store
/// and course catalog.
pub fn build_orchestrator(
    config: &Config,
    store: Arc<dyn InteractionStore>,
    catalog: Arc<dyn CourseCatalog>,
) -> Result<Orchestrator, ConfigError> {
    let agents = build_agent_set(config)?;
    let recommendations =
        RecommendationEngine::new(catalog).with_limit(config.recommendation_limit);
    Ok(Orchestrator::new(
        store,
        agents,
        recommendations,
        OrchestratorSettings::from(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::store::MemoryStore;
    use mentor_core::recommendation::StaticCatalog;
    use std::collections::HashMap;
    use std::time::Duration;
    use tracing::Level;

    fn base_config() -> Config {
        Config {
            database_url: None,
            provider: Provider::OpenAI,
            openai_api_key: Some("test-key".to_string()),
            gemini_api_key: None,
            chat_model: "gpt-4o".to_string(),
            model_overrides: HashMap::new(),
            history_window: 10,
            agent_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            recommendation_limit: 5,
            log_level: Level::INFO,
        }
    }

    #[test]
    fn build_agent_set_requires_the_provider_key() {
        let mut config = base_config();
        config.openai_api_key = None;

        let err = build_agent_set(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn build_agent_set_applies_overrides() {
        let mut config = base_config();
        config
            .model_overrides
            .insert(AgentKind::CourseEvaluation, "gpt-4o-mini".to_string());

        // Construction must succeed; no network traffic happens here.
        build_agent_set(&config).unwrap();
    }

    #[test]
    fn build_orchestrator_wires_from_config() {
        let config = base_config();
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(StaticCatalog::new(Vec::new()));

        build_orchestrator(&config, store, catalog).unwrap();
    }

    #[tokio::test]
    async fn build_store_defaults_to_memory_without_database_url() {
        let config = base_config();
        assert!(config.database_url.is_none());

        // Must not try to reach any database.
        build_store(&config).await.unwrap();
    }
}
