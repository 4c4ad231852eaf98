//! Store Contracts
//!
//! The engine depends on these contracts, not on a specific storage engine.
//! Profile and conversation rows are mutated only through
//! `commit_interaction`, the single transactional boundary of an
//! interaction: either every write in a commit persists or none do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mentor_core::analytics::{AgentStats, AnalyticsEvent};
use mentor_core::agent::AgentKind;
use mentor_core::conversation::{Scope, Turn};
use mentor_core::profile::{ProfilePatch, UserProfile};
use mentor_core::recommendation::CourseRecommendation;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Typed store failures. Store/transaction faults are fatal to the
/// interaction and surface as `Backend`; they are never silently swallowed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile already exists for identity '{0}'")]
    AlreadyExists(String),
    #[error("no profile for identity '{0}'")]
    ProfileNotFound(String),
    #[error("out-of-order write for scope {scope}: {attempted} is not after {last}")]
    OutOfOrderWrite {
        scope: String,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
    #[error("store backend failure")]
    Backend(#[source] anyhow::Error),
    #[error("failed to (de)serialize a stored record")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Rejects a write whose timestamp is not strictly after the scope's last
/// turn.
pub(crate) fn check_order(
    scope: &Scope,
    last: Option<DateTime<Utc>>,
    attempted: DateTime<Utc>,
) -> Result<(), StoreError> {
    if let Some(last) = last {
        if attempted <= last {
            return Err(StoreError::OutOfOrderWrite {
                scope: scope.to_string(),
                last,
                attempted,
            });
        }
    }
    Ok(())
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, identity: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Creates the profile; fails with `AlreadyExists` on a duplicate
    /// identity.
    async fn create(&self, profile: UserProfile) -> Result<(), StoreError>;

    /// Applies a partial merge; fails with `ProfileNotFound` when absent.
    async fn merge(
        &self,
        identity: &str,
        patch: &ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError>;

    /// Soft-retires the profile. Retired profiles stay readable; they are
    /// never hard-deleted.
    async fn retire(&self, identity: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends a turn; fails with `OutOfOrderWrite` when the turn's
    /// timestamp is not strictly after the scope's last turn.
    async fn append(&self, scope: &Scope, turn: Turn) -> Result<(), StoreError>;

    /// Returns at most the last `n` turns in chronological order. An
    /// unknown scope yields an empty window, never an error.
    async fn recent_window(&self, scope: &Scope, n: usize) -> Result<Vec<Turn>, StoreError>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Replaces the current recommendation set for a profile as one batch.
    /// Readers never observe a mix of the old and new sets.
    async fn replace_for(
        &self,
        identity: &str,
        batch: Vec<CourseRecommendation>,
    ) -> Result<(), StoreError>;

    async fn current_for(&self, identity: &str)
    -> Result<Vec<CourseRecommendation>, StoreError>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), StoreError>;

    async fn stats(
        &self,
        agent_kind: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<AgentStats, StoreError>;
}

/// Every write a successful interaction produces, applied as one unit.
#[derive(Debug, Clone)]
pub struct InteractionCommit {
    pub scope: Scope,
    /// Present for an onboarding interaction: the profile to create.
    pub new_profile: Option<UserProfile>,
    /// Extraction-derived merge for an existing profile.
    pub patch: Option<ProfilePatch>,
    pub user_turn: Turn,
    pub agent_turn: Turn,
    /// Present when the interaction refreshed recommendations.
    pub recommendations: Option<Vec<CourseRecommendation>>,
    pub committed_at: DateTime<Utc>,
}

#[async_trait]
pub trait InteractionStore:
    ProfileStore + ConversationStore + RecommendationStore + AnalyticsStore
{
    /// Applies the whole commit atomically and returns the post-commit
    /// profile. A validation failure (ordering, duplicate create, missing
    /// profile) aborts the commit with no partial state.
    async fn commit_interaction(
        &self,
        commit: InteractionCommit,
    ) -> Result<UserProfile, StoreError>;
}
