//! In-Memory Store
//!
//! Mutex-guarded maps behind the store contracts. A commit validates every
//! write before applying any of them under one lock, so atomicity holds by
//! construction. Serves tests and embedded deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use mentor_core::analytics::{self, AgentStats, AnalyticsEvent};
use mentor_core::agent::AgentKind;
use mentor_core::conversation::{Scope, Turn};
use mentor_core::profile::{ProfilePatch, UserProfile};
use mentor_core::recommendation::CourseRecommendation;

use super::{
    AnalyticsStore, ConversationStore, InteractionCommit, InteractionStore, ProfileStore,
    RecommendationStore, StoreError, check_order,
};

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, UserProfile>,
    turns: HashMap<Scope, Vec<Turn>>,
    recommendations: HashMap<String, Vec<CourseRecommendation>>,
    analytics: Vec<AnalyticsEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn analytics_events(&self) -> Vec<AnalyticsEvent> {
        self.lock().analytics.clone()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, identity: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock().profiles.get(identity).cloned())
    }

    async fn create(&self, profile: UserProfile) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.profiles.contains_key(&profile.identity) {
            return Err(StoreError::AlreadyExists(profile.identity));
        }
        inner.profiles.insert(profile.identity.clone(), profile);
        Ok(())
    }

    async fn merge(
        &self,
        identity: &str,
        patch: &ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(identity)
            .ok_or_else(|| StoreError::ProfileNotFound(identity.to_string()))?;
        profile.apply(patch, now);
        Ok(profile.clone())
    }

    async fn retire(&self, identity: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let profile = inner
            .profiles
            .get_mut(identity)
            .ok_or_else(|| StoreError::ProfileNotFound(identity.to_string()))?;
        profile.retired = true;
        profile.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(&self, scope: &Scope, turn: Turn) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let turns = inner.turns.entry(scope.clone()).or_default();
        check_order(scope, turns.last().map(|t| t.timestamp), turn.timestamp)?;
        turns.push(turn);
        Ok(())
    }

    async fn recent_window(&self, scope: &Scope, n: usize) -> Result<Vec<Turn>, StoreError> {
        let inner = self.lock();
        let turns = match inner.turns.get(scope) {
            Some(turns) => turns,
            None => return Ok(Vec::new()),
        };
        let start = turns.len().saturating_sub(n);
        Ok(turns[start..].to_vec())
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn replace_for(
        &self,
        identity: &str,
        batch: Vec<CourseRecommendation>,
    ) -> Result<(), StoreError> {
        self.lock()
            .recommendations
            .insert(identity.to_string(), batch);
        Ok(())
    }

    async fn current_for(
        &self,
        identity: &str,
    ) -> Result<Vec<CourseRecommendation>, StoreError> {
        Ok(self
            .lock()
            .recommendations
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        self.lock().analytics.push(event);
        Ok(())
    }

    async fn stats(
        &self,
        agent_kind: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<AgentStats, StoreError> {
        let inner = self.lock();
        Ok(analytics::aggregate(
            inner
                .analytics
                .iter()
                .filter(|event| event.timestamp >= since)
                .filter(|event| agent_kind.is_none_or(|kind| event.agent_kind == kind))
                .map(|event| (event.status, event.latency)),
        ))
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn commit_interaction(
        &self,
        commit: InteractionCommit,
    ) -> Result<UserProfile, StoreError> {
        let mut inner = self.lock();

        // Validate everything before touching any state.
        match &commit.new_profile {
            Some(profile) => {
                if inner.profiles.contains_key(&profile.identity) {
                    return Err(StoreError::AlreadyExists(profile.identity.clone()));
                }
            }
            None => {
                if !inner.profiles.contains_key(&commit.scope.identity) {
                    return Err(StoreError::ProfileNotFound(commit.scope.identity.clone()));
                }
            }
        }
        let last = inner
            .turns
            .get(&commit.scope)
            .and_then(|turns| turns.last())
            .map(|turn| turn.timestamp);
        check_order(&commit.scope, last, commit.user_turn.timestamp)?;
        check_order(
            &commit.scope,
            Some(commit.user_turn.timestamp),
            commit.agent_turn.timestamp,
        )?;

        // Apply.
        if let Some(profile) = commit.new_profile {
            inner.profiles.insert(profile.identity.clone(), profile);
        }
        let identity = commit.scope.identity.clone();
        let profile = inner
            .profiles
            .get_mut(&identity)
            .ok_or_else(|| StoreError::ProfileNotFound(identity.clone()))?;
        if let Some(patch) = &commit.patch {
            profile.apply(patch, commit.committed_at);
        }
        profile.note_interaction(commit.committed_at);
        let snapshot = profile.clone();

        let turns = inner.turns.entry(commit.scope.clone()).or_default();
        turns.push(commit.user_turn);
        turns.push(commit.agent_turn);

        if let Some(batch) = commit.recommendations {
            inner.recommendations.insert(identity, batch);
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    fn ts(offset_secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + offset_secs, 0).unwrap()
    }

    fn scope() -> Scope {
        Scope::new("u1", AgentKind::LearningAssistant)
    }

    fn turn(speaker_user: bool, offset_secs: i64) -> Turn {
        if speaker_user {
            Turn::user(AgentKind::LearningAssistant, "question", ts(offset_secs))
        } else {
            Turn::agent(AgentKind::LearningAssistant, "answer", ts(offset_secs))
        }
    }

    fn commit_for(store_scope: Scope, offset_secs: i64) -> InteractionCommit {
        InteractionCommit {
            scope: store_scope.clone(),
            new_profile: None,
            patch: None,
            user_turn: Turn::user(store_scope.agent_kind, "q", ts(offset_secs)),
            agent_turn: Turn::agent(store_scope.agent_kind, "a", ts(offset_secs + 1)),
            recommendations: None,
            committed_at: ts(offset_secs + 1),
        }
    }

    #[tokio::test]
    async fn append_rejects_out_of_order_turns() {
        let store = MemoryStore::new();
        store.append(&scope(), turn(true, 10)).await.unwrap();

        let err = store.append(&scope(), turn(false, 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrderWrite { .. }));

        let err = store.append(&scope(), turn(false, 5)).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrderWrite { .. }));
    }

    #[tokio::test]
    async fn recent_window_is_bounded_and_chronological() {
        let store = MemoryStore::new();
        for offset in [1, 2, 3] {
            store.append(&scope(), turn(offset % 2 == 1, offset)).await.unwrap();
        }

        let window = store.recent_window(&scope(), 2).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp, ts(2));
        assert_eq!(window[1].timestamp, ts(3));

        let empty = store
            .recent_window(&Scope::new("nobody", AgentKind::CareerGuidance), 5)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_identity() {
        let store = MemoryStore::new();
        store
            .create(UserProfile::new("u1", ts(0)))
            .await
            .unwrap();

        let err = store
            .create(UserProfile::new("u1", ts(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(identity) if identity == "u1"));
    }

    #[tokio::test]
    async fn merge_requires_existing_profile() {
        let store = MemoryStore::new();
        let err = store
            .merge("ghost", &ProfilePatch::default(), ts(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProfileNotFound(identity) if identity == "ghost"));
    }

    #[tokio::test]
    async fn retire_marks_profile_without_deleting_it() {
        let store = MemoryStore::new();
        store.create(UserProfile::new("u1", ts(0))).await.unwrap();

        store.retire("u1").await.unwrap();

        let profile = store.get("u1").await.unwrap().unwrap();
        assert!(profile.retired);
    }

    #[tokio::test]
    async fn commit_applies_profile_turns_and_recommendations_together() {
        let store = MemoryStore::new();
        let mut profile = UserProfile::new("u1", ts(0));
        profile
            .career_context
            .insert("goal".to_string(), json!("backend engineer"));

        let commit = InteractionCommit {
            scope: scope(),
            new_profile: Some(profile),
            patch: Some(ProfilePatch {
                learning_challenges: Some(vec!["ownership".to_string()]),
                ..Default::default()
            }),
            user_turn: turn(true, 10),
            agent_turn: turn(false, 11),
            recommendations: Some(vec![CourseRecommendation {
                identity: "u1".to_string(),
                course_id: 7,
                score: 2.0,
                rationale: "matches career goal".to_string(),
                generated_at: ts(11),
            }]),
            committed_at: ts(11),
        };

        let committed = store.commit_interaction(commit).await.unwrap();

        assert_eq!(committed.total_conversations, 1);
        assert_eq!(committed.learning_challenges, vec!["ownership"]);
        assert_eq!(store.recent_window(&scope(), 10).await.unwrap().len(), 2);
        assert_eq!(store.current_for("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_partial_state() {
        let store = MemoryStore::new();
        store.create(UserProfile::new("u1", ts(0))).await.unwrap();

        // Agent turn not after the user turn: the commit must fail as a
        // whole, leaving profile, turns, and recommendations untouched.
        let bad = InteractionCommit {
            scope: scope(),
            new_profile: None,
            patch: Some(ProfilePatch {
                learning_challenges: Some(vec!["recursion".to_string()]),
                ..Default::default()
            }),
            user_turn: turn(true, 10),
            agent_turn: turn(false, 10),
            recommendations: Some(vec![CourseRecommendation {
                identity: "u1".to_string(),
                course_id: 7,
                score: 2.0,
                rationale: "matches career goal".to_string(),
                generated_at: ts(10),
            }]),
            committed_at: ts(10),
        };

        let err = store.commit_interaction(bad).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrderWrite { .. }));

        let profile = store.get("u1").await.unwrap().unwrap();
        assert_eq!(profile.total_conversations, 0);
        assert!(profile.learning_challenges.is_empty());
        assert!(store.recent_window(&scope(), 10).await.unwrap().is_empty());
        assert!(store.current_for("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_for_unknown_identity_requires_onboarding_profile() {
        let store = MemoryStore::new();
        let err = store.commit_interaction(commit_for(scope(), 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn replace_for_supersedes_the_whole_batch() {
        let store = MemoryStore::new();
        let old = vec![
            CourseRecommendation {
                identity: "u1".to_string(),
                course_id: 1,
                score: 2.0,
                rationale: "old".to_string(),
                generated_at: ts(0),
            },
            CourseRecommendation {
                identity: "u1".to_string(),
                course_id: 2,
                score: 1.0,
                rationale: "old".to_string(),
                generated_at: ts(0),
            },
        ];
        store.replace_for("u1", old).await.unwrap();

        let new = vec![CourseRecommendation {
            identity: "u1".to_string(),
            course_id: 3,
            score: 3.0,
            rationale: "new".to_string(),
            generated_at: ts(5),
        }];
        store.replace_for("u1", new).await.unwrap();

        let current = store.current_for("u1").await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].course_id, 3);
    }

    #[tokio::test]
    async fn stats_filter_by_kind_and_time() {
        let store = MemoryStore::new();
        let latency = StdDuration::from_millis(100);
        for (kind, status, offset) in [
            (AgentKind::LearningAssistant, mentor_core::analytics::InteractionStatus::Success, 10),
            (AgentKind::LearningAssistant, mentor_core::analytics::InteractionStatus::AgentError, 20),
            (AgentKind::CareerGuidance, mentor_core::analytics::InteractionStatus::Success, 30),
        ] {
            store
                .record(AnalyticsEvent::new("u1", kind, status, latency, ts(offset)))
                .await
                .unwrap();
        }

        let all = store.stats(None, ts(0)).await.unwrap();
        assert_eq!(all.total_interactions, 3);

        let learning = store
            .stats(Some(AgentKind::LearningAssistant), ts(0))
            .await
            .unwrap();
        assert_eq!(learning.total_interactions, 2);
        assert!((learning.success_rate - 0.5).abs() < f64::EPSILON);

        let recent = store.stats(None, ts(25)).await.unwrap();
        assert_eq!(recent.total_interactions, 1);
    }
}
