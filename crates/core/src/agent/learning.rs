//! Learning Assistant Agent
//!
//! Helps a learner while they work through course material. The caller may
//! attach chapter context to anchor the prompt. When the user's message
//! signals difficulty, the current topic is recorded as a learning challenge
//! so the profile accumulates struggle signal over time.

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    AgentCapability, AgentContext, AgentError, AgentKind, AgentReply, Extraction, build_messages,
};
use crate::llm::{CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You are a learning assistant helping a student \
through course material on a technology learning platform. Answer questions \
about the current chapter, explain concepts clearly with examples and \
analogies, give hints for exercises without full solutions, and encourage \
the student. Be patient and adapt to their level.";

/// Phrases that mark a message as a struggle signal.
const DIFFICULTY_MARKERS: [&str; 4] = ["don't understand", "confused", "stuck", "difficult"];

pub struct LearningAssistantAgent {
    client: Arc<dyn LlmClient>,
}

impl LearningAssistantAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentCapability for LearningAssistantAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::LearningAssistant
    }

    async fn respond(&self, ctx: &AgentContext) -> Result<AgentReply, AgentError> {
        let mut system_prompt = SYSTEM_PROMPT.to_string();
        if let Some(course) = &ctx.course {
            if let Some(title) = &course.chapter_title {
                system_prompt.push_str(&format!("\n\nCurrent chapter: {title}"));
            }
            if let Some(summary) = &course.chapter_summary {
                system_prompt.push_str(&format!("\nChapter summary: {summary}"));
            }
        }
        if !ctx.profile.skill_profile.is_empty() {
            system_prompt.push_str(&format!(
                "\n\nStudent's skill profile: {}",
                serde_json::Value::Object(ctx.profile.skill_profile.clone())
            ));
        }

        let request = CompletionRequest::new(build_messages(system_prompt, ctx));
        let content = self.client.complete(request).await?;
        if content.trim().is_empty() {
            return Err(AgentError::InvalidOutput(
                "learning assistant reply was empty".to_string(),
            ));
        }

        let extraction = difficulty_topic(ctx).map(|topic| Extraction {
            learning_challenges: vec![topic],
            ..Default::default()
        });

        Ok(AgentReply {
            content,
            extraction,
        })
    }
}

/// Returns the topic to record as a challenge when the user's message
/// signals difficulty.
fn difficulty_topic(ctx: &AgentContext) -> Option<String> {
    let message = ctx.input.to_lowercase();
    if !DIFFICULTY_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        return None;
    }
    let topic = ctx
        .course
        .as_ref()
        .and_then(|course| course.chapter_title.clone())
        .unwrap_or_else(|| "current chapter".to_string());
    Some(topic)
}
