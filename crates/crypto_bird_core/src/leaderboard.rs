//! crates/crypto_bird_core/src/leaderboard.rs
//!
//! Read-only ranking of players by best score.

use std::sync::Arc;

use crate::domain::{LeaderboardEntry, User};
use crate::error::{CoreResult, ValidationError};
use crate::ports::ProgressStore;

#[derive(Clone)]
pub struct LeaderboardView {
    store: Arc<dyn ProgressStore>,
}

impl LeaderboardView {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// The best `n` players, highest best score first.
    ///
    /// Ties go to the earlier registration, then to the lower identity. Users without any
    /// session rank with a best score of 0.
    pub async fn top_n(&self, n: u32) -> CoreResult<Vec<LeaderboardEntry>> {
        if n == 0 {
            return Err(ValidationError::single("limit", "must be at least 1").into());
        }
        let users = self.store.top_players(n).await?;
        Ok(users.iter().zip(1..).map(|(user, rank)| entry(user, rank)).collect())
    }
}

fn entry(user: &User, rank: u32) -> LeaderboardEntry {
    LeaderboardEntry {
        rank,
        user_id: user.user_id.clone(),
        display_name: user.display_name().map(str::to_string),
        best_score: user.totals.best_score,
        total_games: user.totals.total_games,
        total_score: user.totals.total_score,
    }
}
