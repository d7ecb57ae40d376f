//! crates/crypto_bird_core/src/ports.rs
//!
//! Defines the store contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete persistence engine.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Achievement, DailyAnalytics, DailyStat, GameSession, LifetimeTotals,
    Overview, Referral, SessionSummary, User, UserProfile, UserStats,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the persistence engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

/// The transactional store behind every core component.
///
/// Writes that must be atomic go through [`ProgressStore::begin`]; everything else is
/// a single-statement read or a conditional insert.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Opens a unit of work. Dropping the returned transaction without committing
    /// discards everything written through it.
    async fn begin(&self) -> PortResult<Box<dyn ProgressTransaction>>;

    // --- User Management ---
    /// Refreshes display fields and the activity timestamp, creating the row on first contact.
    async fn touch_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> PortResult<()>;

    async fn get_user(&self, user_id: &str) -> PortResult<User>;

    // --- Stats ---
    /// Sums the daily rollups of a known user. `NotFound` when the identity is unknown.
    async fn get_user_stats(&self, user_id: &str) -> PortResult<UserStats>;

    async fn get_daily_stat(&self, user_id: &str, date: NaiveDate) -> PortResult<DailyStat>;

    /// Users ordered by lifetime best score, then earliest registration, then identity.
    async fn top_players(&self, limit: u32) -> PortResult<Vec<User>>;

    // --- Achievements ---
    /// Most recent first.
    async fn get_achievements_for_user(&self, user_id: &str) -> PortResult<Vec<Achievement>>;

    // --- Referrals ---
    async fn insert_referral_if_absent(&self, referral: &Referral) -> PortResult<bool>;

    async fn count_referrals(&self, referrer_id: &str) -> PortResult<i64>;

    async fn get_referral_for(&self, referred_id: &str) -> PortResult<Referral>;

    // --- Back Office ---
    async fn overview(&self, today: NaiveDate) -> PortResult<Overview>;

    /// Newest registrations first.
    async fn list_users(&self, limit: u32, offset: u64) -> PortResult<Vec<User>>;

    /// Newest sessions first.
    async fn list_sessions(&self, limit: u32, offset: u64) -> PortResult<Vec<SessionSummary>>;

    /// One row per UTC calendar day on or after `since`, newest day first.
    async fn daily_analytics(&self, since: NaiveDate) -> PortResult<Vec<DailyAnalytics>>;
}

/// A single unit of work against the store.
#[async_trait]
pub trait ProgressTransaction: Send {
    /// Creates a bare user row if the identity has never been seen; bumps its activity otherwise.
    async fn ensure_user(&mut self, user_id: &str, now: DateTime<Utc>) -> PortResult<()>;

    /// Conditional insert of a newly registered user. Returns `false` when the identity exists.
    async fn insert_user_if_absent(&mut self, user: &User) -> PortResult<bool>;

    /// Conditional insert guarded by the one-referrer-per-user constraint.
    async fn insert_referral_if_absent(&mut self, referral: &Referral) -> PortResult<bool>;

    async fn insert_session(&mut self, session: &GameSession) -> PortResult<()>;

    /// Atomic upsert of the (user, day) rollup. Returns the post-update row.
    async fn upsert_daily_stat(&mut self, session: &GameSession) -> PortResult<DailyStat>;

    /// Atomic increment of the user's lifetime counters. Returns the post-update values.
    async fn bump_lifetime_totals(&mut self, session: &GameSession) -> PortResult<LifetimeTotals>;

    /// Conditional insert guarded by the (user, achievement type) uniqueness constraint.
    /// Returns `false` when the achievement was already held.
    async fn insert_achievement_if_absent(&mut self, achievement: &Achievement) -> PortResult<bool>;

    async fn commit(self: Box<Self>) -> PortResult<()>;

    async fn rollback(self: Box<Self>) -> PortResult<()>;
}
