//! crates/crypto_bird_core/src/pipeline.rs
//!
//! The write path: one submitted session becomes a session fact, updated aggregates
//! and any newly earned achievements, all inside a single store transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::achievements::AchievementEngine;
use crate::domain::SessionOutcome;
use crate::error::{CoreError, CoreResult};
use crate::ingest::{SessionIngestor, SessionSubmission, ValidSession};
use crate::ports::{PortResult, ProgressStore, ProgressTransaction};
use crate::stats::StatsAggregator;

#[derive(Clone)]
pub struct SubmissionPipeline {
    store: Arc<dyn ProgressStore>,
    ingestor: SessionIngestor,
    aggregator: StatsAggregator,
    engine: AchievementEngine,
}

impl SubmissionPipeline {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            aggregator: StatsAggregator::new(store.clone()),
            ingestor: SessionIngestor::new(),
            engine: AchievementEngine::new(),
            store,
        }
    }

    pub async fn submit(&self, submission: SessionSubmission) -> CoreResult<SessionOutcome> {
        self.submit_at(submission, Utc::now()).await
    }

    /// Validates and applies a submission as of `now`.
    ///
    /// Either everything becomes durable or nothing does: a validation failure happens
    /// before the transaction is opened, and any store failure rolls the whole unit back.
    pub async fn submit_at(
        &self,
        submission: SessionSubmission,
        now: DateTime<Utc>,
    ) -> CoreResult<SessionOutcome> {
        let session = submission.validate()?;

        let mut tx = self.store.begin().await.map_err(|e| {
            log_failed_submission(&session, &e.to_string());
            CoreError::Persistence(e)
        })?;

        let result = self.run(tx.as_mut(), &session, now).await;
        match result {
            Ok(outcome) => {
                tx.commit().await.map_err(|e| {
                    log_failed_submission(&session, &e.to_string());
                    CoreError::Persistence(e)
                })?;
                info!(
                    session_id = %outcome.session_id,
                    user_id = session.user_id(),
                    new_achievements = outcome.new_achievements.len(),
                    "Session accepted"
                );
                Ok(outcome)
            }
            Err(e) => {
                log_failed_submission(&session, &e.to_string());
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed submission also failed");
                }
                Err(CoreError::Persistence(e))
            }
        }
    }

    async fn run(
        &self,
        tx: &mut dyn ProgressTransaction,
        session: &ValidSession,
        now: DateTime<Utc>,
    ) -> PortResult<SessionOutcome> {
        let fact = self.ingestor.record_session(tx, session, now).await?;
        let update = self.aggregator.apply_session(tx, &fact).await?;
        let new_achievements = self
            .engine
            .evaluate(tx, &fact.user_id, fact.score, update.lifetime.total_games, now)
            .await?;

        Ok(SessionOutcome {
            session_id: fact.id,
            daily: update.daily,
            lifetime: update.lifetime,
            new_achievements,
        })
    }
}

/// Logs enough of the submission to replay it by hand.
fn log_failed_submission(session: &ValidSession, reason: &str) {
    let s = session.submission();
    error!(
        user_id = %s.user_id,
        score = s.score,
        level = s.level,
        coins_earned = s.coins_earned,
        duration_seconds = s.duration_seconds,
        reason,
        "Session submission failed"
    );
}
