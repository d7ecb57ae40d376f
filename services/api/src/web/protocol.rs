//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between game clients, the back-office
//! dashboard and the API server.

use chrono::{DateTime, NaiveDate, Utc};
use crypto_bird_core::domain::{
    Achievement, DailyAnalytics, LeaderboardEntry, Overview, ReferralStats, RegistrationOutcome,
    SessionSummary, User, UserProfile, UserStats,
};
use crypto_bird_core::error::ValidationError;
use crypto_bird_core::ingest::SessionSubmission;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Payloads Sent FROM the Client TO the Server
//=========================================================================================

/// A finished round, as reported by the game client.
///
/// Older clients send `telegram_id` and `duration`; both spellings are accepted.
#[derive(Deserialize, Debug, ToSchema)]
pub struct SaveSessionRequest {
    #[serde(alias = "telegram_id")]
    pub user_id: String,
    pub score: i64,
    pub level: i64,
    pub coins_earned: i64,
    #[serde(alias = "duration")]
    pub duration_seconds: i64,
}

impl From<SaveSessionRequest> for SessionSubmission {
    fn from(req: SaveSessionRequest) -> Self {
        SessionSubmission {
            user_id: req.user_id,
            score: req.score,
            level: req.level,
            coins_earned: req.coins_earned,
            duration_seconds: req.duration_seconds,
        }
    }
}

/// First contact from the messaging front-end, optionally carrying a referral.
#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    #[serde(alias = "telegram_id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub referrer_id: Option<String>,
}

impl RegisterRequest {
    pub fn into_parts(self) -> (UserProfile, Option<String>) {
        let profile = UserProfile {
            user_id: self.user_id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        };
        (profile, self.referrer_id)
    }
}

/// Refreshed display-name fields sent on every contact.
#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct ActivityRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl ActivityRequest {
    pub fn into_profile(self, user_id: String) -> UserProfile {
        UserProfile {
            user_id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Number of entries to return. Defaults to the configured page size.
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsQuery {
    /// How many calendar days to report, ending today.
    pub days: Option<i64>,
}

//=========================================================================================
// Payloads Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
pub struct AchievementView {
    #[serde(rename = "type")]
    pub achievement_type: String,
    pub name: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

impl From<Achievement> for AchievementView {
    fn from(a: Achievement) -> Self {
        Self {
            achievement_type: a.achievement_type,
            name: a.name,
            description: a.description,
            earned_at: a.earned_at,
        }
    }
}

/// The acknowledgement of a saved session, with the achievements it unlocked.
///
/// Deployed game clients read `success` and `achievements`; the key names are frozen.
#[derive(Serialize, Debug, ToSchema)]
pub struct SaveSessionResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub achievements: Vec<AchievementView>,
    pub message: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct UserStatsResponse {
    pub total_games: i64,
    pub best_score: i64,
    pub total_score: i64,
    pub total_coins: i64,
    pub avg_score: f64,
}

impl From<UserStats> for UserStatsResponse {
    fn from(s: UserStats) -> Self {
        Self {
            total_games: s.total_games,
            best_score: s.best_score,
            total_score: s.total_score,
            total_coins: s.total_coins,
            avg_score: s.avg_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct LeaderboardEntryView {
    pub rank: u32,
    pub user_id: String,
    pub display_name: Option<String>,
    pub best_score: i64,
    pub total_games: i64,
    pub total_score: i64,
}

impl From<LeaderboardEntry> for LeaderboardEntryView {
    fn from(e: LeaderboardEntry) -> Self {
        Self {
            rank: e.rank,
            user_id: e.user_id,
            display_name: e.display_name,
            best_score: e.best_score,
            total_games: e.total_games,
            total_score: e.total_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ReferralStatsResponse {
    pub referral_count: i64,
    pub bonus_amount: i64,
    pub bonus_active: bool,
}

impl From<ReferralStats> for ReferralStatsResponse {
    fn from(s: ReferralStats) -> Self {
        Self {
            referral_count: s.referral_count,
            bonus_amount: s.bonus_amount,
            bonus_active: s.bonus_active,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RegisterResponse {
    pub created: bool,
    pub referral_recorded: bool,
}

impl From<RegistrationOutcome> for RegisterResponse {
    fn from(o: RegistrationOutcome) -> Self {
        Self {
            created: o.created,
            referral_recorded: o.referral_recorded,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct OverviewResponse {
    pub total_users: i64,
    pub total_games: i64,
    pub new_users_today: i64,
    pub games_today: i64,
    pub avg_score: Option<f64>,
    pub max_score: Option<i64>,
}

impl From<Overview> for OverviewResponse {
    fn from(o: Overview) -> Self {
        Self {
            total_users: o.total_users,
            total_games: o.total_games,
            new_users_today: o.new_users_today,
            games_today: o.games_today,
            avg_score: o.avg_score,
            max_score: o.max_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct UserRow {
    pub user_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub referrer_id: Option<String>,
    pub total_games: i64,
    pub best_score: i64,
    pub total_score: i64,
}

impl From<User> for UserRow {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            registered_at: u.registered_at,
            last_active_at: u.last_active_at,
            referrer_id: u.referrer_id,
            total_games: u.totals.total_games,
            best_score: u.totals.best_score,
            total_score: u.totals.total_score,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub user_id: String,
    pub display_name: Option<String>,
    pub score: i64,
    pub level: i64,
    pub coins_earned: i64,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionRow {
    fn from(s: SessionSummary) -> Self {
        Self {
            session_id: s.session.id,
            user_id: s.session.user_id,
            display_name: s.display_name,
            score: s.session.score,
            level: s.session.level,
            coins_earned: s.session.coins_earned,
            duration_seconds: s.session.duration_seconds,
            created_at: s.session.created_at,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AnalyticsRow {
    pub date: NaiveDate,
    pub games_count: i64,
    pub unique_users: i64,
    pub avg_score: f64,
    pub max_score: i64,
    pub total_coins: i64,
}

impl From<DailyAnalytics> for AnalyticsRow {
    fn from(d: DailyAnalytics) -> Self {
        Self {
            date: d.date,
            games_count: d.games_count,
            unique_users: d.unique_users,
            avg_score: d.avg_score,
            max_score: d.max_score,
            total_coins: d.total_coins,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Serialize, Debug, ToSchema)]
pub struct FieldErrorView {
    pub field: String,
    pub message: String,
}

/// The body of every non-2xx response.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldErrorView>,
}

impl ErrorResponse {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            fields: Vec::new(),
        }
    }
}

impl From<&ValidationError> for ErrorResponse {
    fn from(err: &ValidationError) -> Self {
        Self {
            error: "Validation failed".to_string(),
            fields: err
                .violations
                .iter()
                .map(|v| FieldErrorView {
                    field: v.field.to_string(),
                    message: v.message.clone(),
                })
                .collect(),
        }
    }
}
