//! LLM Client Abstraction
//!
//! A single trait hides which provider serves a capability. The concrete
//! client speaks to any OpenAI-compatible chat-completion API; provider
//! identity and model selection are injected at construction, never read
//! from ambient state.

use anyhow::anyhow;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;

/// The role a chat message carries in the prompt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the prompt context handed to the provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A full prompt context for one completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}

/// Why a provider call failed.
///
/// `Transient` failures (timeouts, rate limits, connection drops) are safe to
/// retry; `Permanent` failures (bad request, auth, unparsable response) are
/// not.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transient provider failure")]
    Transient(#[source] anyhow::Error),
    #[error("permanent provider failure")]
    Permanent(#[source] anyhow::Error),
}

/// A generic client for a chat-completion LLM backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produces one text completion for the given prompt context.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// An implementation of `LlmClient` for any OpenAI-compatible API.
pub struct OpenAiCompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL for the provider endpoint.
    /// * `model` - The model identifier to use for completions.
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let messages = request
            .messages
            .into_iter()
            .map(to_provider_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(classify)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::Permanent(anyhow!("completion had no text content")))?;

        Ok(content)
    }
}

fn to_provider_message(msg: ChatMessage) -> Result<ChatCompletionRequestMessage, ProviderError> {
    let built = match msg.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(msg.content)
            .build()
            .map(Into::into),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(msg.content)
            .build()
            .map(Into::into),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(msg.content)
            .build()
            .map(Into::into),
    };
    built.map_err(classify)
}

/// Splits provider failures into retryable and non-retryable kinds.
fn classify(err: OpenAIError) -> ProviderError {
    let transient = match &err {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(api) => looks_transient(&api.message),
        _ => false,
    };
    if transient {
        ProviderError::Transient(anyhow::Error::new(err))
    } else {
        ProviderError::Permanent(anyhow::Error::new(err))
    }
}

fn looks_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit") || message.contains("overloaded") || message.contains("timeout")
}
