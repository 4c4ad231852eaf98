//! User Profile Model
//!
//! A profile is the durable record of a learner's identity, career context,
//! and accumulated skill/preference signal. Profiles are keyed by a stable
//! external handle (a wallet or account address) and are only ever mutated
//! through partial merges: an update never clears a field it does not mention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Durable record of a learner: identity, career context, and signal that
/// accumulates over interactions.
///
/// The identity is immutable after creation and there is exactly one profile
/// per identity. Profiles are never hard-deleted; `retired` marks a profile
/// that no longer accepts interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub identity: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Free-form career attributes (goals, current role, timeline, ...).
    pub career_context: Map<String, Value>,
    /// Skill signal extracted from interactions (levels, assessment scores).
    pub skill_profile: Map<String, Value>,
    pub learning_preferences: Map<String, Value>,
    /// Topics the learner has struggled with, in first-seen order.
    pub learning_challenges: Vec<String>,
    pub total_conversations: u64,
    pub retired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserProfile {
    /// Creates an empty profile for a new identity.
    pub fn new(identity: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            display_name: None,
            email: None,
            career_context: Map::new(),
            skill_profile: Map::new(),
            learning_preferences: Map::new(),
            learning_challenges: Vec::new(),
            total_conversations: 0,
            retired: false,
            created_at: now,
            updated_at: now,
            last_active: now,
        }
    }

    /// Applies a partial merge to this profile.
    ///
    /// Object fields are merged key-by-key (last write wins per key);
    /// `learning_challenges` are unioned without duplicates; scalar fields
    /// are overwritten only when the patch carries a value. Fields the patch
    /// does not mention are left untouched.
    pub fn apply(&mut self, patch: &ProfilePatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(updates) = &patch.career_context {
            merge_into(&mut self.career_context, updates);
        }
        if let Some(updates) = &patch.skill_profile {
            merge_into(&mut self.skill_profile, updates);
        }
        if let Some(updates) = &patch.learning_preferences {
            merge_into(&mut self.learning_preferences, updates);
        }
        if let Some(challenges) = &patch.learning_challenges {
            for challenge in challenges {
                if !self.learning_challenges.contains(challenge) {
                    self.learning_challenges.push(challenge.clone());
                }
            }
        }
        self.updated_at = now;
    }

    /// Bumps the activity counters after a committed interaction.
    pub fn note_interaction(&mut self, now: DateTime<Utc>) {
        self.total_conversations += 1;
        self.last_active = now;
        self.updated_at = now;
    }
}

fn merge_into(target: &mut Map<String, Value>, updates: &Map<String, Value>) {
    for (key, value) in updates {
        target.insert(key.clone(), value.clone());
    }
}

/// A partial profile update. `None` fields are left untouched by the merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub career_context: Option<Map<String, Value>>,
    pub skill_profile: Option<Map<String, Value>>,
    pub learning_preferences: Option<Map<String, Value>>,
    pub learning_challenges: Option<Vec<String>>,
}

impl ProfilePatch {
    /// True when the patch would not change any field.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.email.is_none()
            && self.career_context.as_ref().is_none_or(|m| m.is_empty())
            && self.skill_profile.as_ref().is_none_or(|m| m.is_empty())
            && self
                .learning_preferences
                .as_ref()
                .is_none_or(|m| m.is_empty())
            && self
                .learning_challenges
                .as_ref()
                .is_none_or(|c| c.is_empty())
    }
}

/// The payload of a first onboarding interaction. Only an onboarding-carrying
/// request may create a profile for an unknown identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingData {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub career_context: Map<String, Value>,
    pub learning_preferences: Map<String, Value>,
}

impl OnboardingData {
    /// Builds the initial profile for a new identity.
    pub fn into_profile(self, identity: &str, now: DateTime<Utc>) -> UserProfile {
        let mut profile = UserProfile::new(identity, now);
        profile.display_name = self.display_name;
        profile.email = self.email;
        profile.career_context = self.career_context;
        profile.learning_preferences = self.learning_preferences;
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn apply_merges_without_clearing_unmentioned_fields() {
        let now = Utc::now();
        let mut profile = UserProfile::new("0xabc", now);
        profile.career_context = map(&[
            ("target_role", json!("backend engineer")),
            ("timeline", json!("6 months")),
        ]);
        profile.email = Some("a@example.com".to_string());

        let patch = ProfilePatch {
            career_context: Some(map(&[("target_role", json!("platform engineer"))])),
            ..Default::default()
        };
        profile.apply(&patch, now);

        assert_eq!(
            profile.career_context.get("target_role"),
            Some(&json!("platform engineer"))
        );
        // Keys the patch did not mention survive the merge.
        assert_eq!(
            profile.career_context.get("timeline"),
            Some(&json!("6 months"))
        );
        assert_eq!(profile.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn apply_unions_challenges_without_duplicates() {
        let now = Utc::now();
        let mut profile = UserProfile::new("0xabc", now);
        profile.learning_challenges = vec!["ownership".to_string()];

        let patch = ProfilePatch {
            learning_challenges: Some(vec!["ownership".to_string(), "lifetimes".to_string()]),
            ..Default::default()
        };
        profile.apply(&patch, now);

        assert_eq!(profile.learning_challenges, vec!["ownership", "lifetimes"]);
    }

    #[test]
    fn note_interaction_bumps_counters() {
        let created = Utc::now();
        let mut profile = UserProfile::new("0xabc", created);
        let later = created + chrono::Duration::seconds(5);

        profile.note_interaction(later);

        assert_eq!(profile.total_conversations, 1);
        assert_eq!(profile.last_active, later);
        assert_eq!(profile.created_at, created);
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(ProfilePatch::default().is_empty());
        let patch = ProfilePatch {
            career_context: Some(Map::new()),
            ..Default::default()
        };
        assert!(patch.is_empty());
        let patch = ProfilePatch {
            learning_challenges: Some(vec!["recursion".to_string()]),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn onboarding_builds_initial_profile() {
        let now = Utc::now();
        let data = OnboardingData {
            display_name: Some("Ada".to_string()),
            career_context: map(&[("goal", json!("backend engineer"))]),
            ..Default::default()
        };

        let profile = data.into_profile("0xabc", now);

        assert_eq!(profile.identity, "0xabc");
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert_eq!(
            profile.career_context.get("goal"),
            Some(&json!("backend engineer"))
        );
        assert_eq!(profile.total_conversations, 0);
        assert!(!profile.retired);
    }
}
