//! Interaction Orchestrator
//!
//! Single-entry coordination of one interaction end-to-end: route to the
//! agent variant, assemble the context window, invoke the capability with
//! bounded retries, and commit every resulting write as one atomic unit.
//! Nothing is written to any store until a successful, validated agent
//! result exists, so retries are idempotent from the store's perspective.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{info, warn};

use mentor_core::agent::{
    AgentCapability, AgentContext, AgentError, AgentKind, AgentReply, AgentSet, CourseContext,
    UnknownAgentKind,
};
use mentor_core::analytics::{AnalyticsEvent, InteractionStatus};
use mentor_core::conversation::{Scope, Turn};
use mentor_core::profile::OnboardingData;
use mentor_core::recommendation::{CourseRecommendation, RecommendationEngine};

use crate::analytics::AnalyticsRecorder;
use crate::config::{Config, RetryPolicy};
use crate::scope::ScopeLocks;
use crate::store::{InteractionCommit, InteractionStore, StoreError};

/// One inbound interaction. `agent_kind` is the caller-supplied wire name,
/// validated against the known variant set before any store access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub identity: String,
    pub agent_kind: String,
    pub message: String,
    /// Present only for the first onboarding interaction of an identity.
    pub onboarding: Option<OnboardingData>,
    pub course: Option<CourseContext>,
}

/// What the caller gets back from a successful interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub reply: String,
    pub agent_kind: AgentKind,
    /// True when the interaction merged new signal into the profile (or
    /// created it).
    pub profile_updated: bool,
    /// Present when the interaction refreshed the recommendation set.
    pub recommendations: Option<Vec<CourseRecommendation>>,
}

/// Typed failures the transport layer maps to responses. Every variant is a
/// distinct kind; no interaction failure surfaces as an opaque fault.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error(transparent)]
    UnknownAgentKind(#[from] UnknownAgentKind),
    #[error("no profile for identity '{0}'")]
    ProfileNotFound(String),
    #[error("profile '{0}' is retired")]
    ProfileRetired(String),
    #[error("an interaction is already in flight for scope {0}")]
    ScopeBusy(Scope),
    #[error("agent backend unavailable after {attempts} attempts")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("agent output failed validation: {0}")]
    ValidationFailure(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Policy knobs for the orchestrator, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub history_window: usize,
    pub agent_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            agent_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_window: config.history_window,
            agent_timeout: config.agent_timeout,
            retry: config.retry,
        }
    }
}

enum AttemptFailure {
    Unavailable { attempts: u32, source: anyhow::Error },
    Invalid(String),
}

pub struct Orchestrator {
    store: Arc<dyn InteractionStore>,
    agents: AgentSet,
    recommendations: RecommendationEngine,
    analytics: AnalyticsRecorder,
    locks: ScopeLocks,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        agents: AgentSet,
        recommendations: RecommendationEngine,
        settings: OrchestratorSettings,
    ) -> Self {
        let analytics = AnalyticsRecorder::new(store.clone());
        Self {
            store,
            agents,
            recommendations,
            analytics,
            locks: ScopeLocks::new(),
            settings,
        }
    }

    /// Handles one interaction end-to-end.
    pub async fn handle_interaction(
        &self,
        request: InteractionRequest,
    ) -> Result<InteractionOutcome, InteractionError> {
        // Route before any store access.
        let kind: AgentKind = request.agent_kind.parse()?;
        let scope = Scope::new(request.identity.clone(), kind);

        let _guard = self
            .locks
            .try_acquire(&scope)
            .ok_or_else(|| InteractionError::ScopeBusy(scope.clone()))?;

        let started = Instant::now();

        let (profile, is_new) = match self.store.get(&request.identity).await? {
            Some(profile) if profile.retired => {
                return Err(InteractionError::ProfileRetired(request.identity));
            }
            Some(profile) => (profile, false),
            None => match request.onboarding.clone() {
                // Creation is staged in memory and persisted inside the
                // commit, so a later agent failure leaves no trace.
                Some(data) => (data.into_profile(&request.identity, Utc::now()), true),
                None => return Err(InteractionError::ProfileNotFound(request.identity)),
            },
        };

        let history = self
            .store
            .recent_window(&scope, self.settings.history_window)
            .await?;
        let last_seen = history.last().map(|turn| turn.timestamp);

        let ctx = AgentContext {
            profile: profile.clone(),
            history,
            input: request.message.clone(),
            course: request.course.clone(),
        };
        let capability = self.agents.capability(kind);

        let reply = match self.invoke_with_retry(capability, &ctx, &scope).await {
            Ok(reply) => reply,
            Err(AttemptFailure::Unavailable { attempts, source }) => {
                self.record_outcome(&scope, InteractionStatus::AgentError, started)
                    .await;
                return Err(InteractionError::UpstreamUnavailable { attempts, source });
            }
            Err(AttemptFailure::Invalid(reason)) => {
                self.record_outcome(&scope, InteractionStatus::ValidationFailure, started)
                    .await;
                return Err(InteractionError::ValidationFailure(reason));
            }
        };

        let (user_ts, agent_ts) = turn_timestamps(last_seen);

        let extraction = reply.extraction;
        let refresh = is_new || extraction.as_ref().is_some_and(|e| e.has_signal());
        let patch = extraction.map(|e| e.into_patch()).filter(|p| !p.is_empty());

        let recommendations = if refresh {
            let mut merged = profile.clone();
            if let Some(patch) = &patch {
                merged.apply(patch, agent_ts);
            }
            Some(self.recommendations.recompute(&merged, agent_ts))
        } else {
            None
        };

        let profile_updated = is_new || patch.is_some();
        let commit = InteractionCommit {
            scope: scope.clone(),
            new_profile: is_new.then(|| profile.clone()),
            patch,
            user_turn: Turn::user(kind, request.message, user_ts),
            agent_turn: Turn::agent(kind, reply.content.clone(), agent_ts),
            recommendations: recommendations.clone(),
            committed_at: agent_ts,
        };
        self.store.commit_interaction(commit).await?;

        self.record_outcome(&scope, InteractionStatus::Success, started)
            .await;
        info!(
            scope = %scope,
            profile_updated,
            refreshed_recommendations = recommendations.is_some(),
            "interaction handled"
        );

        Ok(InteractionOutcome {
            reply: reply.content,
            agent_kind: kind,
            profile_updated,
            recommendations,
        })
    }

    /// Invokes the capability under the caller-side timeout, retrying
    /// transient failures with bounded, jittered exponential backoff.
    /// Invalid output is never retried: the same context would likely
    /// reproduce the failure.
    async fn invoke_with_retry(
        &self,
        capability: &dyn AgentCapability,
        ctx: &AgentContext,
        scope: &Scope,
    ) -> Result<AgentReply, AttemptFailure> {
        let policy = self.settings.retry;
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=policy.max_attempts {
            match timeout(self.settings.agent_timeout, capability.respond(ctx)).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(AgentError::InvalidOutput(reason))) => {
                    warn!(scope = %scope, attempt, reason = %reason, "agent output failed validation");
                    return Err(AttemptFailure::Invalid(reason));
                }
                Ok(Err(AgentError::Unavailable(source))) => {
                    warn!(scope = %scope, attempt, error = %source, "agent call failed");
                    last_error = Some(source);
                }
                Err(_elapsed) => {
                    warn!(scope = %scope, attempt, "agent call timed out");
                    last_error = Some(anyhow::anyhow!(
                        "agent call exceeded {:?}",
                        self.settings.agent_timeout
                    ));
                }
            }
            if attempt < policy.max_attempts {
                sleep(backoff_delay(&policy, attempt)).await;
            }
        }

        Err(AttemptFailure::Unavailable {
            attempts: policy.max_attempts,
            source: last_error
                .unwrap_or_else(|| anyhow::anyhow!("agent backend never became available")),
        })
    }

    async fn record_outcome(&self, scope: &Scope, status: InteractionStatus, started: Instant) {
        self.analytics
            .record(AnalyticsEvent::new(
                scope.identity.clone(),
                scope.agent_kind,
                status,
                started.elapsed(),
                Utc::now(),
            ))
            .await;
    }
}

/// Picks strictly increasing timestamps for the user/agent turn pair, also
/// strictly after the scope's last stored turn.
fn turn_timestamps(last_seen: Option<DateTime<Utc>>) -> (DateTime<Utc>, DateTime<Utc>) {
    let step = chrono::Duration::microseconds(1);
    let now = Utc::now();
    let user_ts = match last_seen {
        Some(last) if last >= now => last + step,
        _ => now,
    };
    let agent_now = Utc::now();
    let agent_ts = if agent_now > user_ts {
        agent_now
    } else {
        user_ts + step
    };
    (user_ts, agent_ts)
}

/// Exponential backoff with uniform jitter in `0..=base`.
fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let exponential = policy.base_delay.saturating_mul(1u32 << exponent);
    let jitter_ms = rand::rng().random_range(0..=policy.base_delay.as_millis() as u64);
    exponential + Duration::from_millis(jitter_ms)
}
