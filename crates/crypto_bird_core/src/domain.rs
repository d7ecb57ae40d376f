//! crates/crypto_bird_core/src/domain.rs
//!
//! Defines the pure, core data structures for the game's progress backend.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Durable identifier of a recorded game session.
pub type SessionId = Uuid;

/// A player, keyed by the opaque external identity handed to us by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub referrer_id: Option<String>,
    pub totals: LifetimeTotals,
}

impl User {
    /// Creates a bare user on first contact, with zeroed lifetime counters.
    pub fn first_contact(profile: &UserProfile, referrer_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            registered_at: now,
            last_active_at: now,
            referrer_id,
            totals: LifetimeTotals::default(),
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        display_name(self.first_name.as_deref(), self.username.as_deref())
    }
}

/// The display name shown on rankings: first name, else username.
pub fn display_name<'a>(first_name: Option<&'a str>, username: Option<&'a str>) -> Option<&'a str> {
    first_name
        .filter(|name| !name.trim().is_empty())
        .or(username.filter(|name| !name.trim().is_empty()))
}

/// The identity and display fields a front-end knows about a user on contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    /// A profile carrying nothing but the identity.
    pub fn bare(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

/// Denormalized per-user counters, maintained alongside the daily rollups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifetimeTotals {
    pub total_games: i64,
    pub total_score: i64,
    pub total_coins: i64,
    pub best_score: i64,
}

impl LifetimeTotals {
    /// The totals after counting one more session, or `None` if a counter would overflow.
    pub fn counting(&self, session: &GameSession) -> Option<Self> {
        Some(Self {
            total_games: self.total_games.checked_add(1)?,
            total_score: self.total_score.checked_add(session.score)?,
            total_coins: self.total_coins.checked_add(session.coins_earned)?,
            best_score: self.best_score.max(session.score),
        })
    }
}

/// An immutable record of one completed round of gameplay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub id: SessionId,
    pub user_id: String,
    pub score: i64,
    pub level: i64,
    pub coins_earned: i64,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    /// The calendar day (UTC) this session counts toward.
    pub fn stat_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// Per-user, per-day rollup of sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStat {
    pub user_id: String,
    pub date: NaiveDate,
    pub games_played: i64,
    pub total_score: i64,
    pub total_coins: i64,
    pub best_score: i64,
    pub total_time: i64,
}

impl DailyStat {
    /// The row created by the first session of a day.
    pub fn seeded_from(session: &GameSession) -> Self {
        Self {
            user_id: session.user_id.clone(),
            date: session.stat_date(),
            games_played: 1,
            total_score: session.score,
            total_coins: session.coins_earned,
            best_score: session.score,
            total_time: session.duration_seconds,
        }
    }

    /// The row after folding in one more session of the same day, or `None` if a
    /// counter would overflow.
    pub fn absorbing(&self, session: &GameSession) -> Option<Self> {
        Some(Self {
            user_id: self.user_id.clone(),
            date: self.date,
            games_played: self.games_played.checked_add(1)?,
            total_score: self.total_score.checked_add(session.score)?,
            total_coins: self.total_coins.checked_add(session.coins_earned)?,
            best_score: self.best_score.max(session.score),
            total_time: self.total_time.checked_add(session.duration_seconds)?,
        })
    }
}

/// An awarded achievement. At most one exists per (user, achievement type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Achievement {
    pub user_id: String,
    pub achievement_type: String,
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

/// A one-time link between an inviting and an invited user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    pub referrer_id: String,
    pub referred_id: String,
    pub created_at: DateTime<Utc>,
    pub bonus_applied: bool,
}

//=========================================================================================
// Read Models
//=========================================================================================

/// Aggregated statistics for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub total_games: i64,
    pub best_score: i64,
    pub total_score: i64,
    pub total_coins: i64,
    pub avg_score: f64,
}

impl UserStats {
    pub fn from_sums(total_games: i64, best_score: i64, total_score: i64, total_coins: i64) -> Self {
        let avg_score = if total_games > 0 {
            total_score as f64 / total_games as f64
        } else {
            0.0
        };
        Self {
            total_games,
            best_score,
            total_score,
            total_coins,
            avg_score,
        }
    }
}

/// One row of the ranked leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub display_name: Option<String>,
    pub best_score: i64,
    pub total_games: i64,
    pub total_score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralStats {
    pub referral_count: i64,
    pub bonus_amount: i64,
    pub bonus_active: bool,
}

/// Result of a successful session submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub daily: DailyStat,
    pub lifetime: LifetimeTotals,
    pub new_achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub created: bool,
    pub referral_recorded: bool,
}

//=========================================================================================
// Back-office Read Models
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total_users: i64,
    pub total_games: i64,
    pub new_users_today: i64,
    pub games_today: i64,
    pub avg_score: Option<f64>,
    pub max_score: Option<i64>,
}

/// A recorded session joined with its owner's display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session: GameSession,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAnalytics {
    pub date: NaiveDate,
    pub games_count: i64,
    pub unique_users: i64,
    pub avg_score: f64,
    pub max_score: i64,
    pub total_coins: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(score: i64) -> GameSession {
        GameSession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            score,
            level: 1,
            coins_earned: 4,
            duration_seconds: 60,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn absorbing_accumulates_and_keeps_the_best() {
        let row = DailyStat::seeded_from(&session(300))
            .absorbing(&session(100))
            .unwrap();
        assert_eq!(row.games_played, 2);
        assert_eq!(row.total_score, 400);
        assert_eq!(row.total_coins, 8);
        assert_eq!(row.best_score, 300);
        assert_eq!(row.total_time, 120);
    }

    #[test]
    fn counters_refuse_to_overflow() {
        let mut row = DailyStat::seeded_from(&session(10));
        row.total_score = i64::MAX - 5;
        assert_eq!(row.absorbing(&session(10)), None);

        let totals = LifetimeTotals {
            total_games: i64::MAX,
            ..LifetimeTotals::default()
        };
        assert_eq!(totals.counting(&session(1)), None);
        assert_eq!(
            LifetimeTotals::default().counting(&session(7)),
            Some(LifetimeTotals {
                total_games: 1,
                total_score: 7,
                total_coins: 4,
                best_score: 7,
            })
        );
    }
}
