//! crates/crypto_bird_core/src/stats.rs
//!
//! Owner of the per-day rollups and the per-user lifetime counters.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{DailyStat, GameSession, LifetimeTotals, UserStats};
use crate::error::CoreResult;
use crate::ports::{PortResult, ProgressStore, ProgressTransaction};

/// The aggregates as they stand right after a session was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsUpdate {
    pub daily: DailyStat,
    pub lifetime: LifetimeTotals,
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn ProgressStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Folds `session` into its day's rollup and the owner's lifetime counters.
    ///
    /// Both are single atomic upserts in the store, so concurrent sessions for the same
    /// user serialize on the row instead of racing a read-modify-write.
    pub async fn apply_session(
        &self,
        tx: &mut dyn ProgressTransaction,
        session: &GameSession,
    ) -> PortResult<StatsUpdate> {
        let daily = tx.upsert_daily_stat(session).await?;
        let lifetime = tx.bump_lifetime_totals(session).await?;
        debug!(
            user_id = %session.user_id,
            date = %daily.date,
            games_today = daily.games_played,
            lifetime_games = lifetime.total_games,
            "Aggregates updated"
        );
        Ok(StatsUpdate { daily, lifetime })
    }

    /// Aggregated statistics across all of the user's days.
    pub async fn get_user_stats(&self, user_id: &str) -> CoreResult<UserStats> {
        Ok(self.store.get_user_stats(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn session(user_id: &str, score: i64, coins: i64, at: chrono::DateTime<Utc>) -> GameSession {
        GameSession {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            score,
            level: 1,
            coins_earned: coins,
            duration_seconds: 30,
            created_at: at,
        }
    }

    async fn apply(store: &Arc<InMemoryStore>, s: &GameSession) -> StatsUpdate {
        let aggregator = StatsAggregator::new(store.clone());
        let mut tx = store.begin().await.unwrap();
        tx.ensure_user(&s.user_id, s.created_at).await.unwrap();
        let update = aggregator.apply_session(tx.as_mut(), s).await.unwrap();
        tx.commit().await.unwrap();
        update
    }

    #[tokio::test]
    async fn first_session_of_the_day_seeds_the_row() {
        let store = Arc::new(InMemoryStore::new());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let update = apply(&store, &session("u1", 250, 12, at)).await;

        assert_eq!(update.daily.games_played, 1);
        assert_eq!(update.daily.total_score, 250);
        assert_eq!(update.daily.total_coins, 12);
        assert_eq!(update.daily.best_score, 250);
        assert_eq!(update.daily.total_time, 30);
        assert_eq!(update.lifetime.total_games, 1);
    }

    #[tokio::test]
    async fn later_sessions_increment_and_keep_the_best_score() {
        let store = Arc::new(InMemoryStore::new());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        apply(&store, &session("u1", 400, 5, at)).await;
        let update = apply(&store, &session("u1", 150, 3, at + Duration::minutes(5))).await;

        assert_eq!(update.daily.games_played, 2);
        assert_eq!(update.daily.total_score, 550);
        assert_eq!(update.daily.total_coins, 8);
        assert_eq!(update.daily.best_score, 400);
        assert_eq!(update.lifetime.best_score, 400);
    }

    #[tokio::test]
    async fn a_new_day_gets_a_new_row_but_lifetime_keeps_counting() {
        let store = Arc::new(InMemoryStore::new());
        let day_one = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 5, 2, 0, 1, 0).unwrap();

        apply(&store, &session("u1", 100, 1, day_one)).await;
        let update = apply(&store, &session("u1", 50, 1, day_two)).await;

        assert_eq!(update.daily.games_played, 1);
        assert_eq!(update.daily.date, day_two.date_naive());
        assert_eq!(update.lifetime.total_games, 2);
        assert_eq!(update.lifetime.total_score, 150);
    }

    #[tokio::test]
    async fn user_stats_sum_across_days() {
        let store = Arc::new(InMemoryStore::new());
        let day_one = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();

        apply(&store, &session("u1", 100, 4, day_one)).await;
        apply(&store, &session("u1", 300, 6, day_two)).await;

        let stats = StatsAggregator::new(store.clone()).get_user_stats("u1").await.unwrap();
        assert_eq!(stats, UserStats::from_sums(2, 300, 400, 10));
        assert_eq!(stats.avg_score, 200.0);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let err = StatsAggregator::new(store).get_user_stats("ghost").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
