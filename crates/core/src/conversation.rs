//! Conversation Model
//!
//! A conversation is an append-only, ordered log of turns scoped to one
//! (identity, agent kind) pair. Turns are immutable once written and are
//! strictly timestamp-ordered within their scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::AgentKind;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Speaker::User),
            "agent" => Some(Speaker::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (identity, agent kind) pair that bounds a conversation's ordering and
/// serialization domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub identity: String,
    pub agent_kind: AgentKind,
}

impl Scope {
    pub fn new(identity: impl Into<String>, agent_kind: AgentKind) -> Self {
        Self {
            identity: identity.into(),
            agent_kind,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.identity, self.agent_kind)
    }
}

/// One message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub agent_kind: AgentKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(agent_kind: AgentKind, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::User,
            agent_kind,
            content: content.into(),
            timestamp: at,
        }
    }

    pub fn agent(agent_kind: AgentKind, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            speaker: Speaker::Agent,
            agent_kind,
            content: content.into(),
            timestamp: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_names_identity_and_kind() {
        let scope = Scope::new("0xabc", AgentKind::LearningAssistant);
        assert_eq!(scope.to_string(), "0xabc/learning-assistant");
    }

    #[test]
    fn speaker_round_trips_through_str() {
        for speaker in [Speaker::User, Speaker::Agent] {
            assert_eq!(Speaker::parse(speaker.as_str()), Some(speaker));
        }
        assert_eq!(Speaker::parse("system"), None);
    }
}
