//! Course Recommendation Engine
//!
//! Derives a ranked list of course recommendations from a profile and a
//! course catalog snapshot. Scoring is deterministic for identical inputs:
//! ties are broken by ascending course id so repeated runs over the same
//! snapshot always produce the same ordered list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::profile::UserProfile;

/// Difficulty tier of a catalog course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "beginner",
            CourseLevel::Intermediate => "intermediate",
            CourseLevel::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(CourseLevel::Beginner),
            "intermediate" => Some(CourseLevel::Intermediate),
            "advanced" => Some(CourseLevel::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One course in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub topics: Vec<String>,
    pub level: CourseLevel,
}

/// The course catalog is an external collaborator; the engine only depends
/// on taking a point-in-time snapshot of it.
pub trait CourseCatalog: Send + Sync {
    fn snapshot(&self) -> Vec<Course>;
}

/// A fixed, in-memory catalog for tests and embedded deployments.
pub struct StaticCatalog {
    courses: Vec<Course>,
}

impl StaticCatalog {
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }
}

impl CourseCatalog for StaticCatalog {
    fn snapshot(&self) -> Vec<Course> {
        self.courses.clone()
    }
}

/// A scored course suggestion for one profile. The current set for a profile
/// is always superseded as a whole batch, never partially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecommendation {
    pub identity: String,
    pub course_id: i64,
    pub score: f64,
    pub rationale: String,
    pub generated_at: DateTime<Utc>,
}

const DEFAULT_LIMIT: usize = 5;

const CAREER_MATCH_WEIGHT: f64 = 2.0;
const CHALLENGE_MATCH_WEIGHT: f64 = 1.5;
const PREFERENCE_MATCH_WEIGHT: f64 = 1.0;
const LEVEL_MATCH_WEIGHT: f64 = 0.5;

pub struct RecommendationEngine {
    catalog: Arc<dyn CourseCatalog>,
    limit: usize,
}

impl RecommendationEngine {
    pub fn new(catalog: Arc<dyn CourseCatalog>) -> Self {
        Self {
            catalog,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Scores every catalog course against the profile and returns the
    /// ranked list, highest score first, ties broken by ascending course id.
    /// `generated_at` is injected so the output is a pure function of its
    /// inputs.
    pub fn recompute(
        &self,
        profile: &UserProfile,
        generated_at: DateTime<Utc>,
    ) -> Vec<CourseRecommendation> {
        let career_terms = object_terms(&profile.career_context);
        let preference_terms = object_terms(&profile.learning_preferences);
        let challenges: Vec<String> = profile
            .learning_challenges
            .iter()
            .map(|c| c.to_lowercase())
            .collect();
        let experience = profile
            .career_context
            .get("experience_level")
            .and_then(Value::as_str)
            .and_then(CourseLevel::parse);

        let mut scored: Vec<CourseRecommendation> = self
            .catalog
            .snapshot()
            .into_iter()
            .filter_map(|course| {
                let mut score = 0.0;
                let mut reasons = Vec::new();

                for topic in &course.topics {
                    let topic = topic.to_lowercase();
                    if terms_match(&career_terms, &topic) {
                        score += CAREER_MATCH_WEIGHT;
                        reasons.push(format!("matches career goal ({topic})"));
                    }
                    if terms_match(&challenges, &topic) {
                        score += CHALLENGE_MATCH_WEIGHT;
                        reasons.push(format!("reinforces a challenging topic ({topic})"));
                    }
                    if terms_match(&preference_terms, &topic) {
                        score += PREFERENCE_MATCH_WEIGHT;
                        reasons.push(format!("fits learning preferences ({topic})"));
                    }
                }
                if experience == Some(course.level) {
                    score += LEVEL_MATCH_WEIGHT;
                    reasons.push(format!("suited to {} level", course.level));
                }

                if score <= 0.0 {
                    return None;
                }
                Some(CourseRecommendation {
                    identity: profile.identity.clone(),
                    course_id: course.id,
                    score,
                    rationale: reasons.join("; "),
                    generated_at,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.course_id.cmp(&b.course_id))
        });
        scored.truncate(self.limit);
        scored
    }
}

/// Lowercased string terms from an attribute object, including string array
/// entries.
fn object_terms(map: &Map<String, Value>) -> Vec<String> {
    let mut terms = Vec::new();
    for value in map.values() {
        match value {
            Value::String(s) => terms.push(s.to_lowercase()),
            Value::Array(items) => {
                terms.extend(items.iter().filter_map(Value::as_str).map(str::to_lowercase))
            }
            _ => {}
        }
    }
    terms
}

fn terms_match(terms: &[String], topic: &str) -> bool {
    terms
        .iter()
        .any(|term| term.contains(topic) || topic.contains(term.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn catalog() -> Arc<StaticCatalog> {
        Arc::new(StaticCatalog::new(vec![
            Course {
                id: 1,
                title: "Backend Foundations".to_string(),
                topics: vec!["backend".to_string(), "apis".to_string()],
                level: CourseLevel::Beginner,
            },
            Course {
                id: 2,
                title: "Distributed Systems".to_string(),
                topics: vec!["backend".to_string(), "consensus".to_string()],
                level: CourseLevel::Advanced,
            },
            Course {
                id: 3,
                title: "Frontend Basics".to_string(),
                topics: vec!["css".to_string(), "react".to_string()],
                level: CourseLevel::Beginner,
            },
        ]))
    }

    fn profile_with_goal(goal: &str) -> UserProfile {
        let mut profile = UserProfile::new("0xabc", Utc::now());
        profile
            .career_context
            .insert("target_role".to_string(), json!(goal));
        profile
    }

    #[test]
    fn recompute_is_deterministic() {
        let engine = RecommendationEngine::new(catalog());
        let profile = profile_with_goal("backend engineer");
        let at = Utc::now();

        let first = engine.recompute(&profile, at);
        let second = engine.recompute(&profile, at);

        assert!(!first.is_empty());
        let ids: Vec<i64> = first.iter().map(|r| r.course_id).collect();
        let again: Vec<i64> = second.iter().map(|r| r.course_id).collect();
        assert_eq!(ids, again);
        let scores: Vec<f64> = first.iter().map(|r| r.score).collect();
        let again: Vec<f64> = second.iter().map(|r| r.score).collect();
        assert_eq!(scores, again);
    }

    #[test]
    fn ties_break_by_ascending_course_id() {
        let engine = RecommendationEngine::new(catalog());
        let profile = profile_with_goal("backend engineer");

        let recs = engine.recompute(&profile, Utc::now());

        // Both backend courses match the goal with equal weight.
        assert_eq!(recs[0].course_id, 1);
        assert_eq!(recs[1].course_id, 2);
        assert_eq!(recs[0].score, recs[1].score);
    }

    #[test]
    fn challenges_boost_matching_courses() {
        let engine = RecommendationEngine::new(catalog());
        let mut profile = profile_with_goal("backend engineer");
        profile.learning_challenges.push("consensus".to_string());

        let recs = engine.recompute(&profile, Utc::now());

        assert_eq!(recs[0].course_id, 2);
        assert!(recs[0].rationale.contains("challenging topic"));
    }

    #[test]
    fn unmatched_profile_yields_no_recommendations() {
        let engine = RecommendationEngine::new(catalog());
        let profile = UserProfile::new("0xabc", Utc::now());

        assert!(engine.recompute(&profile, Utc::now()).is_empty());
    }

    #[test]
    fn limit_caps_the_batch() {
        let engine = RecommendationEngine::new(catalog()).with_limit(1);
        let profile = profile_with_goal("backend engineer");

        assert_eq!(engine.recompute(&profile, Utc::now()).len(), 1);
    }
}
