//! Content Generation Agent
//!
//! Generates study material (summaries, practice exercises, explanations) on
//! request, shaped by the learner's preferences.

use async_trait::async_trait;
use std::sync::Arc;

use super::{AgentCapability, AgentContext, AgentError, AgentKind, AgentReply, build_messages};
use crate::llm::{CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You generate study material for a technology \
learning platform: summaries, practice exercises, and worked explanations. \
Produce well-structured material matched to the learner's request and \
preferences.";

pub struct ContentGenerationAgent {
    client: Arc<dyn LlmClient>,
}

impl ContentGenerationAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentCapability for ContentGenerationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ContentGeneration
    }

    async fn respond(&self, ctx: &AgentContext) -> Result<AgentReply, AgentError> {
        let mut system_prompt = SYSTEM_PROMPT.to_string();
        if !ctx.profile.learning_preferences.is_empty() {
            system_prompt.push_str(&format!(
                "\n\nLearner preferences: {}",
                serde_json::Value::Object(ctx.profile.learning_preferences.clone())
            ));
        }

        let request = CompletionRequest::new(build_messages(system_prompt, ctx));
        let content = self.client.complete(request).await?;
        if content.trim().is_empty() {
            return Err(AgentError::InvalidOutput(
                "generated content was empty".to_string(),
            ));
        }

        Ok(AgentReply {
            content,
            extraction: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::profile::UserProfile;
    use chrono::Utc;

    fn ctx(input: &str) -> AgentContext {
        AgentContext {
            profile: UserProfile::new("0xabc", Utc::now()),
            history: Vec::new(),
            input: input.to_string(),
            course: None,
        }
    }

    #[tokio::test]
    async fn generated_content_is_returned_without_extraction() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_| Ok("## Practice exercises\n1. ...".to_string()));

        let agent = ContentGenerationAgent::new(Arc::new(client));
        let reply = agent.respond(&ctx("exercises on ownership")).await.unwrap();

        assert!(reply.content.starts_with("## Practice exercises"));
        assert!(reply.extraction.is_none());
    }

    #[tokio::test]
    async fn empty_generation_is_invalid_output() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .times(1)
            .returning(|_| Ok(String::new()));

        let agent = ContentGenerationAgent::new(Arc::new(client));
        let err = agent.respond(&ctx("exercises")).await.unwrap_err();

        assert!(matches!(err, AgentError::InvalidOutput(_)));
    }
}
