//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::config::Config;
use crypto_bird_core::ports::ProgressStore;
use crypto_bird_core::{
    AchievementLog, BackOffice, LeaderboardView, ReferralLedger, Registrar, StatsAggregator, SubmissionPipeline,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub submissions: SubmissionPipeline,
    pub stats: StatsAggregator,
    pub achievements: AchievementLog,
    pub leaderboard: LeaderboardView,
    pub referrals: ReferralLedger,
    pub registrar: Registrar,
    pub backoffice: BackOffice,
}

impl AppState {
    /// Wires every core component to the same store.
    pub fn new(store: Arc<dyn ProgressStore>, config: Arc<Config>) -> Self {
        let referrals = ReferralLedger::with_bonus(store.clone(), config.referral_bonus);
        Self {
            submissions: SubmissionPipeline::new(store.clone()),
            stats: StatsAggregator::new(store.clone()),
            achievements: AchievementLog::new(store.clone()),
            leaderboard: LeaderboardView::new(store.clone()),
            registrar: Registrar::new(store.clone(), referrals.clone()),
            backoffice: BackOffice::new(store),
            referrals,
            config,
        }
    }
}
