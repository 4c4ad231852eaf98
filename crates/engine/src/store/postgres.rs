//! PostgreSQL-Backed Store
//!
//! All four record kinds behind one connection pool. The profile record is
//! stored as a JSONB document; turns, recommendations, and analytics events
//! are row-per-record. `commit_interaction` runs inside a single database
//! transaction, which is the atomic boundary the orchestrator relies on.
//!
//! Schema evolution beyond the bootstrap below is a migration-tooling
//! concern and lives outside this crate.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use std::time::Duration;

use mentor_core::analytics::{self, AgentStats, AnalyticsEvent, InteractionStatus};
use mentor_core::agent::AgentKind;
use mentor_core::conversation::{Scope, Speaker, Turn};
use mentor_core::profile::{ProfilePatch, UserProfile};
use mentor_core::recommendation::CourseRecommendation;

use super::{
    AnalyticsStore, ConversationStore, InteractionCommit, InteractionStore, ProfileStore,
    RecommendationStore, StoreError, check_order,
};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS user_profiles (
        identity TEXT PRIMARY KEY,
        record JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS conversation_turns (
        id BIGSERIAL PRIMARY KEY,
        identity TEXT NOT NULL,
        agent_kind TEXT NOT NULL,
        speaker TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_turns_scope
        ON conversation_turns (identity, agent_kind, created_at)",
    "CREATE TABLE IF NOT EXISTS course_recommendations (
        identity TEXT NOT NULL,
        course_id BIGINT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        rationale TEXT NOT NULL,
        generated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS agent_analytics (
        id UUID PRIMARY KEY,
        identity TEXT NOT NULL,
        agent_kind TEXT NOT NULL,
        status TEXT NOT NULL,
        latency_ms BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
];

/// A wrapper around the `PgPool` implementing the store contracts.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool and bootstraps the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Creates the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

async fn read_profile(
    conn: &mut PgConnection,
    identity: &str,
) -> Result<Option<UserProfile>, StoreError> {
    let row = sqlx::query("SELECT record FROM user_profiles WHERE identity = $1")
        .bind(identity)
        .fetch_optional(conn)
        .await?;
    match row {
        Some(row) => {
            let record: serde_json::Value = row.try_get("record")?;
            Ok(Some(serde_json::from_value(record)?))
        }
        None => Ok(None),
    }
}

async fn write_profile(conn: &mut PgConnection, profile: &UserProfile) -> Result<(), StoreError> {
    let record = serde_json::to_value(profile)?;
    sqlx::query(
        "INSERT INTO user_profiles (identity, record, updated_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (identity)
         DO UPDATE SET record = EXCLUDED.record, updated_at = EXCLUDED.updated_at",
    )
    .bind(&profile.identity)
    .bind(record)
    .bind(profile.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn last_turn_at(
    conn: &mut PgConnection,
    scope: &Scope,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let row = sqlx::query(
        "SELECT created_at FROM conversation_turns
         WHERE identity = $1 AND agent_kind = $2
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(&scope.identity)
    .bind(scope.agent_kind.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(|row| row.try_get::<DateTime<Utc>, _>("created_at"))
        .transpose()
        .map_err(Into::into)
}

async fn insert_turn(
    conn: &mut PgConnection,
    scope: &Scope,
    turn: &Turn,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO conversation_turns (identity, agent_kind, speaker, content, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&scope.identity)
    .bind(scope.agent_kind.as_str())
    .bind(turn.speaker.as_str())
    .bind(&turn.content)
    .bind(turn.timestamp)
    .execute(conn)
    .await?;
    Ok(())
}

async fn write_recommendations(
    conn: &mut PgConnection,
    identity: &str,
    batch: &[CourseRecommendation],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM course_recommendations WHERE identity = $1")
        .bind(identity)
        .execute(&mut *conn)
        .await?;
    for rec in batch {
        sqlx::query(
            "INSERT INTO course_recommendations (identity, course_id, score, rationale, generated_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(identity)
        .bind(rec.course_id)
        .bind(rec.score)
        .bind(&rec.rationale)
        .bind(rec.generated_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn decode_turn(row: &PgRow) -> Result<Turn, StoreError> {
    let speaker_raw: String = row.try_get("speaker")?;
    let kind_raw: String = row.try_get("agent_kind")?;
    let speaker = Speaker::parse(&speaker_raw)
        .ok_or_else(|| StoreError::Backend(anyhow!("unknown speaker '{speaker_raw}'")))?;
    let agent_kind = kind_raw
        .parse::<AgentKind>()
        .map_err(|err| StoreError::Backend(err.into()))?;
    Ok(Turn {
        speaker,
        agent_kind,
        content: row.try_get("content")?,
        timestamp: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get(&self, identity: &str) -> Result<Option<UserProfile>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        read_profile(&mut conn, identity).await
    }

    async fn create(&self, profile: UserProfile) -> Result<(), StoreError> {
        let record = serde_json::to_value(&profile)?;
        let result = sqlx::query(
            "INSERT INTO user_profiles (identity, record, updated_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (identity) DO NOTHING",
        )
        .bind(&profile.identity)
        .bind(record)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(profile.identity));
        }
        Ok(())
    }

    async fn merge(
        &self,
        identity: &str,
        patch: &ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut profile = read_profile(&mut tx, identity)
            .await?
            .ok_or_else(|| StoreError::ProfileNotFound(identity.to_string()))?;
        profile.apply(patch, now);
        write_profile(&mut tx, &profile).await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn retire(&self, identity: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut profile = read_profile(&mut tx, identity)
            .await?
            .ok_or_else(|| StoreError::ProfileNotFound(identity.to_string()))?;
        profile.retired = true;
        profile.updated_at = Utc::now();
        write_profile(&mut tx, &profile).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn append(&self, scope: &Scope, turn: Turn) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let last = last_turn_at(&mut tx, scope).await?;
        check_order(scope, last, turn.timestamp)?;
        insert_turn(&mut tx, scope, &turn).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn recent_window(&self, scope: &Scope, n: usize) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT speaker, agent_kind, content, created_at FROM conversation_turns
             WHERE identity = $1 AND agent_kind = $2
             ORDER BY created_at DESC
             LIMIT $3",
        )
        .bind(&scope.identity)
        .bind(scope.agent_kind.as_str())
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = rows
            .iter()
            .map(decode_turn)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }
}

#[async_trait]
impl RecommendationStore for PgStore {
    async fn replace_for(
        &self,
        identity: &str,
        batch: Vec<CourseRecommendation>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        write_recommendations(&mut tx, identity, &batch).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn current_for(
        &self,
        identity: &str,
    ) -> Result<Vec<CourseRecommendation>, StoreError> {
        let rows = sqlx::query(
            "SELECT course_id, score, rationale, generated_at FROM course_recommendations
             WHERE identity = $1
             ORDER BY score DESC, course_id ASC",
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CourseRecommendation {
                    identity: identity.to_string(),
                    course_id: row.try_get("course_id")?,
                    score: row.try_get("score")?,
                    rationale: row.try_get("rationale")?,
                    generated_at: row.try_get("generated_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn record(&self, event: AnalyticsEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agent_analytics (id, identity, agent_kind, status, latency_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(&event.identity)
        .bind(event.agent_kind.as_str())
        .bind(event.status.as_str())
        .bind(event.latency.as_millis() as i64)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(
        &self,
        agent_kind: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<AgentStats, StoreError> {
        let rows = match agent_kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT status, latency_ms FROM agent_analytics
                     WHERE created_at >= $1 AND agent_kind = $2",
                )
                .bind(since)
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT status, latency_ms FROM agent_analytics WHERE created_at >= $1")
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(analytics::aggregate(rows.iter().filter_map(|row| {
            let status: String = row.try_get("status").ok()?;
            let latency_ms: i64 = row.try_get("latency_ms").ok()?;
            let status = InteractionStatus::parse(&status)?;
            Some((status, Duration::from_millis(latency_ms.max(0) as u64)))
        })))
    }
}

#[async_trait]
impl InteractionStore for PgStore {
    async fn commit_interaction(
        &self,
        commit: InteractionCommit,
    ) -> Result<UserProfile, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut profile = match commit.new_profile {
            Some(profile) => {
                if read_profile(&mut tx, &profile.identity).await?.is_some() {
                    return Err(StoreError::AlreadyExists(profile.identity));
                }
                profile
            }
            None => read_profile(&mut tx, &commit.scope.identity)
                .await?
                .ok_or_else(|| StoreError::ProfileNotFound(commit.scope.identity.clone()))?,
        };

        let last = last_turn_at(&mut tx, &commit.scope).await?;
        check_order(&commit.scope, last, commit.user_turn.timestamp)?;
        check_order(
            &commit.scope,
            Some(commit.user_turn.timestamp),
            commit.agent_turn.timestamp,
        )?;

        if let Some(patch) = &commit.patch {
            profile.apply(patch, commit.committed_at);
        }
        profile.note_interaction(commit.committed_at);

        write_profile(&mut tx, &profile).await?;
        insert_turn(&mut tx, &commit.scope, &commit.user_turn).await?;
        insert_turn(&mut tx, &commit.scope, &commit.agent_turn).await?;
        if let Some(batch) = &commit.recommendations {
            write_recommendations(&mut tx, &commit.scope.identity, batch).await?;
        }

        tx.commit().await?;
        Ok(profile)
    }
}
