//! Interaction Analytics Model
//!
//! One event is recorded per interaction: which agent handled it, how it
//! ended, and how long it took. Events are write-once and only ever read
//! back for aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::agent::AgentKind;

/// How an interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionStatus {
    Success,
    AgentError,
    ValidationFailure,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Success => "success",
            InteractionStatus::AgentError => "agent-error",
            InteractionStatus::ValidationFailure => "validation-failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(InteractionStatus::Success),
            "agent-error" => Some(InteractionStatus::AgentError),
            "validation-failure" => Some(InteractionStatus::ValidationFailure),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once record of one handled interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub identity: String,
    pub agent_kind: AgentKind,
    pub status: InteractionStatus,
    /// Wall-clock latency of the whole interaction, retries included.
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(
        identity: impl Into<String>,
        agent_kind: AgentKind,
        status: InteractionStatus,
        latency: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity: identity.into(),
            agent_kind,
            status,
            latency,
            timestamp,
        }
    }
}

/// Aggregate view over a set of analytics events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub total_interactions: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

/// Folds `(status, latency)` pairs into aggregate stats. Empty input yields
/// the zero stats rather than dividing by zero.
pub fn aggregate(events: impl IntoIterator<Item = (InteractionStatus, Duration)>) -> AgentStats {
    let mut total = 0u64;
    let mut successes = 0u64;
    let mut latency_ms = 0f64;
    for (status, latency) in events {
        total += 1;
        if status == InteractionStatus::Success {
            successes += 1;
        }
        latency_ms += latency.as_secs_f64() * 1000.0;
    }
    if total == 0 {
        return AgentStats::default();
    }
    AgentStats {
        total_interactions: total,
        success_rate: successes as f64 / total as f64,
        avg_latency_ms: latency_ms / total as f64,
    }
}
