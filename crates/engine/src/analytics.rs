//! Analytics Recorder
//!
//! Recording is fire-and-forget from the orchestrator's perspective:
//! analytics sits outside the atomic interaction commit, and a failed write
//! must never roll back an otherwise-successful interaction. Failures are
//! logged, not propagated.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use mentor_core::agent::AgentKind;
use mentor_core::analytics::{AgentStats, AnalyticsEvent};

use crate::store::{AnalyticsStore, StoreError};

#[derive(Clone)]
pub struct AnalyticsRecorder {
    store: Arc<dyn AnalyticsStore>,
}

impl AnalyticsRecorder {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Records the event, logging instead of propagating a failed write.
    pub async fn record(&self, event: AnalyticsEvent) {
        let identity = event.identity.clone();
        let agent_kind = event.agent_kind;
        let status = event.status;
        if let Err(err) = self.store.record(event).await {
            warn!(
                identity = %identity,
                agent_kind = %agent_kind,
                status = %status,
                error = %err,
                "failed to record analytics event"
            );
        }
    }

    pub async fn stats(
        &self,
        agent_kind: Option<AgentKind>,
        since: DateTime<Utc>,
    ) -> Result<AgentStats, StoreError> {
        self.store.stats(agent_kind, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mentor_core::analytics::InteractionStatus;
    use std::time::Duration;

    struct FailingAnalyticsStore;

    #[async_trait]
    impl AnalyticsStore for FailingAnalyticsStore {
        async fn record(&self, _event: AnalyticsEvent) -> Result<(), StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("disk full")))
        }

        async fn stats(
            &self,
            _agent_kind: Option<AgentKind>,
            _since: DateTime<Utc>,
        ) -> Result<AgentStats, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("disk full")))
        }
    }

    #[tokio::test]
    async fn failed_record_is_swallowed() {
        let recorder = AnalyticsRecorder::new(Arc::new(FailingAnalyticsStore));
        // Must not panic or surface the error.
        recorder
            .record(AnalyticsEvent::new(
                "u1",
                AgentKind::LearningAssistant,
                InteractionStatus::Success,
                Duration::from_millis(10),
                Utc::now(),
            ))
            .await;
    }
}
