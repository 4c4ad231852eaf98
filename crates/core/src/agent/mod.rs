//! Agent Capability Abstraction
//!
//! Every specialized conversational agent implements one interface: given a
//! profile snapshot, a bounded window of recent turns, and the current user
//! input, produce a reply plus optional structured extraction. Capabilities
//! are pure with respect to the stores; their only side effect is the LLM
//! call through the injected client. The variant set is closed so routing
//! can be checked exhaustively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::conversation::{Speaker, Turn};
use crate::llm::{ChatMessage, LlmClient};
use crate::profile::{ProfilePatch, UserProfile};

mod career;
mod content;
mod evaluation;
mod learning;

pub use career::CareerGuidanceAgent;
pub use content::ContentGenerationAgent;
pub use evaluation::CourseEvaluationAgent;
pub use learning::LearningAssistantAgent;

/// The closed set of agent variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    CareerGuidance,
    LearningAssistant,
    CourseEvaluation,
    ContentGeneration,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::CareerGuidance,
        AgentKind::LearningAssistant,
        AgentKind::CourseEvaluation,
        AgentKind::ContentGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::CareerGuidance => "career-guidance",
            AgentKind::LearningAssistant => "learning-assistant",
            AgentKind::CourseEvaluation => "course-evaluation",
            AgentKind::ContentGeneration => "content-generation",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-supplied agent kind that is not in the known variant set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent kind '{0}'")]
pub struct UnknownAgentKind(pub String);

impl FromStr for AgentKind {
    type Err = UnknownAgentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAgentKind(s.to_string()))
    }
}

/// Course/chapter context the caller may attach to an interaction, used by
/// the learning and evaluation agents to anchor their prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseContext {
    pub course_id: Option<i64>,
    pub chapter_title: Option<String>,
    pub chapter_summary: Option<String>,
}

/// Everything a capability sees for one interaction.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub profile: UserProfile,
    /// Recent turns for the scope, oldest first.
    pub history: Vec<Turn>,
    pub input: String,
    pub course: Option<CourseContext>,
}

/// Structured signal an agent derives from its own completion, fed back into
/// the profile by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub career_context: Option<Map<String, Value>>,
    pub skill_profile: Option<Map<String, Value>>,
    pub learning_preferences: Option<Map<String, Value>>,
    pub learning_challenges: Vec<String>,
    pub score: Option<f64>,
}

impl Extraction {
    /// True when the extraction carries new skill/preference signal worth a
    /// recommendation refresh.
    pub fn has_signal(&self) -> bool {
        self.career_context.as_ref().is_some_and(|m| !m.is_empty())
            || self.skill_profile.as_ref().is_some_and(|m| !m.is_empty())
            || self
                .learning_preferences
                .as_ref()
                .is_some_and(|m| !m.is_empty())
            || !self.learning_challenges.is_empty()
            || self.score.is_some()
    }

    /// Converts the extraction into a profile merge.
    pub fn into_patch(self) -> ProfilePatch {
        let mut skill_profile = self.skill_profile;
        if let Some(score) = self.score {
            skill_profile
                .get_or_insert_with(Map::new)
                .insert("last_assessment_score".to_string(), score.into());
        }
        ProfilePatch {
            display_name: None,
            email: None,
            career_context: self.career_context,
            skill_profile,
            learning_preferences: self.learning_preferences,
            learning_challenges: if self.learning_challenges.is_empty() {
                None
            } else {
                Some(self.learning_challenges)
            },
        }
    }
}

/// What a capability produces for one interaction.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub content: String,
    pub extraction: Option<Extraction>,
}

/// Why a capability failed.
///
/// Both variants are recoverable by the orchestrator: `Unavailable` is
/// retried with backoff, `InvalidOutput` is surfaced without retry since the
/// same context would likely reproduce the failure.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent backend unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("agent produced invalid output: {0}")]
    InvalidOutput(String),
}

impl From<crate::llm::ProviderError> for AgentError {
    fn from(err: crate::llm::ProviderError) -> Self {
        AgentError::Unavailable(anyhow::Error::new(err))
    }
}

/// The uniform interface every agent variant implements.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Produces a reply for the given context. Pure apart from the LLM call:
    /// capabilities never write to any store.
    async fn respond(&self, ctx: &AgentContext) -> Result<AgentReply, AgentError>;
}

/// Registry holding one capability instance per variant.
///
/// Lookup is an exhaustive match over `AgentKind`, so adding a variant
/// without wiring a capability fails to compile.
pub struct AgentSet {
    career: CareerGuidanceAgent,
    learning: LearningAssistantAgent,
    evaluation: CourseEvaluationAgent,
    content: ContentGenerationAgent,
}

impl fmt::Debug for AgentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSet").finish_non_exhaustive()
    }
}

impl AgentSet {
    /// Builds a registry where every variant shares one client.
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            career: CareerGuidanceAgent::new(client.clone()),
            learning: LearningAssistantAgent::new(client.clone()),
            evaluation: CourseEvaluationAgent::new(client.clone()),
            content: ContentGenerationAgent::new(client),
        }
    }

    /// Replaces the client of a single variant, for per-agent provider or
    /// model overrides.
    pub fn with_client(mut self, kind: AgentKind, client: Arc<dyn LlmClient>) -> Self {
        match kind {
            AgentKind::CareerGuidance => self.career = CareerGuidanceAgent::new(client),
            AgentKind::LearningAssistant => self.learning = LearningAssistantAgent::new(client),
            AgentKind::CourseEvaluation => self.evaluation = CourseEvaluationAgent::new(client),
            AgentKind::ContentGeneration => self.content = ContentGenerationAgent::new(client),
        }
        self
    }

    pub fn capability(&self, kind: AgentKind) -> &dyn AgentCapability {
        match kind {
            AgentKind::CareerGuidance => &self.career,
            AgentKind::LearningAssistant => &self.learning,
            AgentKind::CourseEvaluation => &self.evaluation,
            AgentKind::ContentGeneration => &self.content,
        }
    }
}

/// Builds the standard prompt context: system prompt, then the recent turn
/// window mapped to user/assistant messages, then the current input.
pub(crate) fn build_messages(system_prompt: String, ctx: &AgentContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(ctx.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    for turn in &ctx.history {
        match turn.speaker {
            Speaker::User => messages.push(ChatMessage::user(turn.content.clone())),
            Speaker::Agent => messages.push(ChatMessage::assistant(turn.content.clone())),
        }
    }
    messages.push(ChatMessage::user(ctx.input.clone()));
    messages
}

/// Extracts a JSON object from a completion that may wrap it in markdown
/// fences or surrounding prose. Returns `None` when no object can be parsed.
pub(crate) fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_kind_parses_known_wire_names() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn agent_kind_rejects_unknown_wire_names() {
        let err = "grader-v2".parse::<AgentKind>().unwrap_err();
        assert_eq!(err, UnknownAgentKind("grader-v2".to_string()));
    }

    #[test]
    fn parse_json_object_handles_fences_and_prose() {
        let fenced = "```json\n{\"target_role\": \"backend engineer\"}\n```";
        let parsed = parse_json_object(fenced).unwrap();
        assert_eq!(parsed.get("target_role"), Some(&json!("backend engineer")));

        let prose = "Sure! Here you go: {\"a\": 1} hope that helps";
        assert_eq!(parse_json_object(prose).unwrap().get("a"), Some(&json!(1)));

        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn empty_extraction_has_no_signal() {
        assert!(!Extraction::default().has_signal());
    }

    #[test]
    fn score_counts_as_signal_and_lands_in_skill_profile() {
        let extraction = Extraction {
            score: Some(87.0),
            ..Default::default()
        };
        assert!(extraction.has_signal());

        let patch = extraction.into_patch();
        let skills = patch.skill_profile.unwrap();
        assert_eq!(skills.get("last_assessment_score"), Some(&json!(87.0)));
    }

    #[test]
    fn challenges_convert_into_patch() {
        let extraction = Extraction {
            learning_challenges: vec!["recursion".to_string()],
            ..Default::default()
        };
        let patch = extraction.into_patch();
        assert_eq!(
            patch.learning_challenges,
            Some(vec!["recursion".to_string()])
        );
    }
}
