//! crates/crypto_bird_core/src/ingest.rs
//!
//! Validation of submitted sessions and the writer of the immutable session fact.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::GameSession;
use crate::error::ValidationError;
use crate::ports::{PortResult, ProgressTransaction};

/// A completed session as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubmission {
    pub user_id: String,
    pub score: i64,
    pub level: i64,
    pub coins_earned: i64,
    pub duration_seconds: i64,
}

/// Largest value accepted for any numeric field of a single session.
pub const MAX_SESSION_VALUE: i64 = i32::MAX as i64;

fn check_range(error: &mut ValidationError, field: &'static str, value: i64, min: i64) {
    if value < min {
        error.push(field, format!("must be at least {min}"));
    } else if value > MAX_SESSION_VALUE {
        error.push(field, format!("must be at most {MAX_SESSION_VALUE}"));
    }
}

/// A submission that passed range checks. Only obtainable through [`SessionSubmission::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSession(SessionSubmission);

impl SessionSubmission {
    /// Checks every field and reports all violations at once.
    pub fn validate(self) -> Result<ValidSession, ValidationError> {
        let mut error = ValidationError::default();
        if self.user_id.trim().is_empty() {
            error.push("user_id", "must not be empty");
        }
        check_range(&mut error, "score", self.score, 0);
        check_range(&mut error, "level", self.level, 1);
        check_range(&mut error, "coins_earned", self.coins_earned, 0);
        check_range(&mut error, "duration_seconds", self.duration_seconds, 0);
        error.into_result()?;
        Ok(ValidSession(self))
    }
}

impl ValidSession {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    pub fn submission(&self) -> &SessionSubmission {
        &self.0
    }
}

/// Appends session facts. Never updates or deletes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionIngestor;

impl SessionIngestor {
    pub fn new() -> Self {
        Self
    }

    /// Persists the session as a new fact inside `tx` and returns it.
    ///
    /// The owning user row is created on first contact so the aggregates always have a home.
    pub async fn record_session(
        &self,
        tx: &mut dyn ProgressTransaction,
        session: &ValidSession,
        now: DateTime<Utc>,
    ) -> PortResult<GameSession> {
        let s = session.submission();
        let fact = GameSession {
            id: Uuid::new_v4(),
            user_id: s.user_id.clone(),
            score: s.score,
            level: s.level,
            coins_earned: s.coins_earned,
            duration_seconds: s.duration_seconds,
            created_at: now,
        };

        tx.ensure_user(&fact.user_id, now).await?;
        tx.insert_session(&fact).await?;
        debug!(session_id = %fact.id, user_id = %fact.user_id, score = fact.score, "Session recorded");
        Ok(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> SessionSubmission {
        SessionSubmission {
            user_id: "4242".into(),
            score: 120,
            level: 3,
            coins_earned: 7,
            duration_seconds: 45,
        }
    }

    #[test]
    fn valid_submission_passes() {
        let valid = submission().validate().unwrap();
        assert_eq!(valid.user_id(), "4242");
        assert_eq!(valid.submission().score, 120);
    }

    #[test]
    fn zero_values_are_in_range() {
        let s = SessionSubmission {
            score: 0,
            level: 1,
            coins_earned: 0,
            duration_seconds: 0,
            ..submission()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn every_bad_field_is_reported() {
        let s = SessionSubmission {
            user_id: "  ".into(),
            score: -1,
            level: 0,
            coins_earned: -5,
            duration_seconds: -2,
        };
        let err = s.validate().unwrap_err();
        assert_eq!(
            err.fields().collect::<Vec<_>>(),
            vec!["user_id", "score", "level", "coins_earned", "duration_seconds"]
        );
    }

    #[test]
    fn negative_score_alone_is_rejected() {
        let s = SessionSubmission { score: -1, ..submission() };
        let err = s.validate().unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), vec!["score"]);
    }

    #[test]
    fn values_beyond_the_session_maximum_are_rejected() {
        let s = SessionSubmission {
            score: i64::MAX,
            level: MAX_SESSION_VALUE + 1,
            coins_earned: MAX_SESSION_VALUE,
            duration_seconds: MAX_SESSION_VALUE,
            ..submission()
        };
        let err = s.validate().unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), vec!["score", "level"]);
        assert_eq!(err.violations[0].message, "must be at most 2147483647");
    }
}
