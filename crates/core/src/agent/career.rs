//! Career Guidance Agent
//!
//! Helps a learner discover and refine a career direction. After the
//! conversational reply, a second completion distills the exchange into a
//! career-context object that is merged back into the profile. An
//! unparsable extraction completion degrades to "no extraction" rather than
//! failing the interaction.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{
    AgentCapability, AgentContext, AgentError, AgentKind, AgentReply, Extraction, build_messages,
    parse_json_object,
};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You are a career guidance advisor on a technology \
learning platform. Help the learner discover a career path, understand what \
roles fit their background, and plan concrete next steps. For a new learner, \
ask about their current situation, target role, motivation, and timeline. For \
a returning learner, review progress toward their stated goal and recommend \
next steps. Be conversational and encouraging.";

const EXTRACTION_PROMPT: &str = "From the exchange below, extract the \
learner's career context as a JSON object with any of these keys that apply: \
current_role, target_role, industries, timeline, motivation. Return ONLY the \
JSON object; return {} if the exchange carries no new career information.";

pub struct CareerGuidanceAgent {
    client: Arc<dyn LlmClient>,
}

impl CareerGuidanceAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Runs the follow-up extraction completion. Provider failures and
    /// unparsable output both degrade to `None`; the reply already succeeded
    /// and a lost extraction only delays profile signal.
    async fn extract_career_context(&self, input: &str, reply: &str) -> Option<Extraction> {
        let prompt = format!(
            "{EXTRACTION_PROMPT}\n\nLearner: {input}\nAdvisor: {reply}"
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);

        let raw = match self.client.complete(request).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(error = %err, "career extraction call failed, continuing without it");
                return None;
            }
        };

        let map = parse_json_object(&raw)?;
        if map.is_empty() {
            return None;
        }
        Some(Extraction {
            career_context: Some(map),
            ..Default::default()
        })
    }
}

#[async_trait]
impl AgentCapability for CareerGuidanceAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::CareerGuidance
    }

    async fn respond(&self, ctx: &AgentContext) -> Result<AgentReply, AgentError> {
        let mut system_prompt = SYSTEM_PROMPT.to_string();
        if !ctx.profile.career_context.is_empty() {
            system_prompt.push_str(&format!(
                "\n\nKnown career context: {}",
                serde_json::Value::Object(ctx.profile.career_context.clone())
            ));
        }

        let request = CompletionRequest::new(build_messages(system_prompt, ctx));
        let content = self.client.complete(request).await?;
        if content.trim().is_empty() {
            return Err(AgentError::InvalidOutput(
                "career guidance reply was empty".to_string(),
            ));
        }

        let extraction = self.extract_career_context(&ctx.input, &content).await;

        Ok(AgentReply {
            content,
            extraction,
        })
    }
}
