//! Course Evaluation Agent
//!
//! Grades a learner's submission against the course material. The completion
//! must carry a JSON object with a numeric `score` in 0..=100 and written
//! `feedback`; anything else is invalid output. The score flows back into
//! the profile as assessment signal.

use async_trait::async_trait;
use std::sync::Arc;

use super::{
    AgentCapability, AgentContext, AgentError, AgentKind, AgentReply, Extraction, build_messages,
    parse_json_object,
};
use crate::llm::{CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You are grading a learner's submission on a \
technology learning platform. Evaluate the submission for correctness, \
depth, and clarity. Respond ONLY with a JSON object of the form \
{\"score\": <number 0-100>, \"feedback\": \"<written feedback>\"}.";

pub struct CourseEvaluationAgent {
    client: Arc<dyn LlmClient>,
}

impl CourseEvaluationAgent {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AgentCapability for CourseEvaluationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::CourseEvaluation
    }

    async fn respond(&self, ctx: &AgentContext) -> Result<AgentReply, AgentError> {
        let mut system_prompt = SYSTEM_PROMPT.to_string();
        if let Some(course) = &ctx.course {
            if let Some(title) = &course.chapter_title {
                system_prompt.push_str(&format!("\n\nChapter under evaluation: {title}"));
            }
            if let Some(summary) = &course.chapter_summary {
                system_prompt.push_str(&format!("\nChapter summary: {summary}"));
            }
        }

        let request = CompletionRequest::new(build_messages(system_prompt, ctx));
        let raw = self.client.complete(request).await?;

        let parsed = parse_json_object(&raw).ok_or_else(|| {
            AgentError::InvalidOutput("evaluation was not a JSON object".to_string())
        })?;

        let score = parsed
            .get("score")
            .and_then(|value| value.as_f64())
            .ok_or_else(|| {
                AgentError::InvalidOutput("evaluation carried no numeric score".to_string())
            })?;
        if !(0.0..=100.0).contains(&score) {
            return Err(AgentError::InvalidOutput(format!(
                "evaluation score {score} outside 0..=100"
            )));
        }

        let feedback = parsed
            .get("feedback")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();
        if feedback.is_empty() {
            return Err(AgentError::InvalidOutput(
                "evaluation carried no feedback".to_string(),
            ));
        }

        Ok(AgentReply {
            content: feedback,
            extraction: Some(Extraction {
                score: Some(score),
                ..Default::default()
            }),
        })
    }
}
