//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the store ports from the `core` crate. It handles all interactions with the
//! PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crypto_bird_core::domain::{
    display_name, Achievement, DailyAnalytics, DailyStat, GameSession, LifetimeTotals, Overview,
    Referral, SessionSummary, User, UserProfile, UserStats,
};
use crypto_bird_core::ports::{PortError, PortResult, ProgressStore, ProgressTransaction};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ProgressStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => unexpected(e),
    }
}

const INSERT_REFERRAL: &str = "INSERT INTO referrals (referred_id, referrer_id, created_at, bonus_applied) \
     VALUES ($1, $2, $3, $4) ON CONFLICT (referred_id) DO NOTHING";

const USER_COLUMNS: &str = "user_id, username, first_name, last_name, registered_at, \
     last_active_at, referrer_id, total_games, total_score, total_coins, best_score";

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: String,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    registered_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
    referrer_id: Option<String>,
    total_games: i64,
    total_score: i64,
    total_coins: i64,
    best_score: i64,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            registered_at: self.registered_at,
            last_active_at: self.last_active_at,
            referrer_id: self.referrer_id,
            totals: LifetimeTotals {
                total_games: self.total_games,
                total_score: self.total_score,
                total_coins: self.total_coins,
                best_score: self.best_score,
            },
        }
    }
}

#[derive(FromRow)]
struct LifetimeRecord {
    total_games: i64,
    total_score: i64,
    total_coins: i64,
    best_score: i64,
}
impl LifetimeRecord {
    fn to_domain(self) -> LifetimeTotals {
        LifetimeTotals {
            total_games: self.total_games,
            total_score: self.total_score,
            total_coins: self.total_coins,
            best_score: self.best_score,
        }
    }
}

#[derive(FromRow)]
struct DailyStatRecord {
    user_id: String,
    stat_date: NaiveDate,
    games_played: i64,
    total_score: i64,
    total_coins: i64,
    best_score: i64,
    total_time: i64,
}
impl DailyStatRecord {
    fn to_domain(self) -> DailyStat {
        DailyStat {
            user_id: self.user_id,
            date: self.stat_date,
            games_played: self.games_played,
            total_score: self.total_score,
            total_coins: self.total_coins,
            best_score: self.best_score,
            total_time: self.total_time,
        }
    }
}

#[derive(FromRow)]
struct AchievementRecord {
    user_id: String,
    achievement_type: String,
    name: String,
    description: String,
    earned_at: DateTime<Utc>,
}
impl AchievementRecord {
    fn to_domain(self) -> Achievement {
        Achievement {
            user_id: self.user_id,
            achievement_type: self.achievement_type,
            name: self.name,
            description: self.description,
            earned_at: self.earned_at,
        }
    }
}

#[derive(FromRow)]
struct ReferralRecord {
    referrer_id: String,
    referred_id: String,
    created_at: DateTime<Utc>,
    bonus_applied: bool,
}
impl ReferralRecord {
    fn to_domain(self) -> Referral {
        Referral {
            referrer_id: self.referrer_id,
            referred_id: self.referred_id,
            created_at: self.created_at,
            bonus_applied: self.bonus_applied,
        }
    }
}

#[derive(FromRow)]
struct SessionSummaryRecord {
    id: Uuid,
    user_id: String,
    score: i64,
    level: i64,
    coins_earned: i64,
    duration_seconds: i64,
    created_at: DateTime<Utc>,
    username: Option<String>,
    first_name: Option<String>,
}
impl SessionSummaryRecord {
    fn to_domain(self) -> SessionSummary {
        SessionSummary {
            display_name: display_name(self.first_name.as_deref(), self.username.as_deref())
                .map(str::to_string),
            session: GameSession {
                id: self.id,
                user_id: self.user_id,
                score: self.score,
                level: self.level,
                coins_earned: self.coins_earned,
                duration_seconds: self.duration_seconds,
                created_at: self.created_at,
            },
        }
    }
}

#[derive(FromRow)]
struct OverviewRecord {
    total_users: i64,
    total_games: i64,
    new_users_today: i64,
    games_today: i64,
    avg_score: Option<f64>,
    max_score: Option<i64>,
}
impl OverviewRecord {
    fn to_domain(self) -> Overview {
        Overview {
            total_users: self.total_users,
            total_games: self.total_games,
            new_users_today: self.new_users_today,
            games_today: self.games_today,
            avg_score: self.avg_score,
            max_score: self.max_score,
        }
    }
}

#[derive(FromRow)]
struct AnalyticsRecord {
    day: NaiveDate,
    games_count: i64,
    unique_users: i64,
    avg_score: f64,
    max_score: i64,
    total_coins: i64,
}
impl AnalyticsRecord {
    fn to_domain(self) -> DailyAnalytics {
        DailyAnalytics {
            date: self.day,
            games_count: self.games_count,
            unique_users: self.unique_users,
            avg_score: self.avg_score,
            max_score: self.max_score,
            total_coins: self.total_coins,
        }
    }
}

//=========================================================================================
// `ProgressStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn begin(&self) -> PortResult<Box<dyn ProgressTransaction>> {
        let tx = self.pool.begin().await.map_err(unexpected)?;
        Ok(Box::new(DbTransaction { tx }))
    }

    async fn touch_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, username, first_name, last_name, registered_at, last_active_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 username = EXCLUDED.username, \
                 first_name = EXCLUDED.first_name, \
                 last_name = EXCLUDED.last_name, \
                 last_active_at = EXCLUDED.last_active_at",
        )
        .bind(&profile.user_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_stats(&self, user_id: &str) -> PortResult<UserStats> {
        let record = sqlx::query_as::<_, LifetimeRecord>(
            "SELECT COALESCE(SUM(d.games_played), 0)::BIGINT AS total_games, \
                    COALESCE(SUM(d.total_score), 0)::BIGINT AS total_score, \
                    COALESCE(SUM(d.total_coins), 0)::BIGINT AS total_coins, \
                    COALESCE(MAX(d.best_score), 0)::BIGINT AS best_score \
             FROM users u \
             LEFT JOIN daily_stats d ON d.user_id = u.user_id \
             WHERE u.user_id = $1 \
             GROUP BY u.user_id",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", user_id)))?;
        Ok(UserStats::from_sums(
            record.total_games,
            record.best_score,
            record.total_score,
            record.total_coins,
        ))
    }

    async fn get_daily_stat(&self, user_id: &str, date: NaiveDate) -> PortResult<DailyStat> {
        let record = sqlx::query_as::<_, DailyStatRecord>(
            "SELECT user_id, stat_date, games_played, total_score, total_coins, best_score, total_time \
             FROM daily_stats WHERE user_id = $1 AND stat_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            not_found_or_unexpected(e, || format!("No stats for user {} on {}", user_id, date))
        })?;
        Ok(record.to_domain())
    }

    async fn top_players(&self, limit: u32) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             ORDER BY best_score DESC, registered_at ASC, user_id ASC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_achievements_for_user(&self, user_id: &str) -> PortResult<Vec<Achievement>> {
        let records = sqlx::query_as::<_, AchievementRecord>(
            "SELECT user_id, achievement_type, name, description, earned_at FROM achievements \
             WHERE user_id = $1 ORDER BY earned_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_referral_if_absent(&self, referral: &Referral) -> PortResult<bool> {
        let result = sqlx::query(INSERT_REFERRAL)
            .bind(&referral.referred_id)
            .bind(&referral.referrer_id)
            .bind(referral.created_at)
            .bind(referral.bonus_applied)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_referrals(&self, referrer_id: &str) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
            .bind(referrer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn get_referral_for(&self, referred_id: &str) -> PortResult<Referral> {
        let record = sqlx::query_as::<_, ReferralRecord>(
            "SELECT referrer_id, referred_id, created_at, bonus_applied FROM referrals \
             WHERE referred_id = $1",
        )
        .bind(referred_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("No referral for user {}", referred_id)))?;
        Ok(record.to_domain())
    }

    async fn overview(&self, today: NaiveDate) -> PortResult<Overview> {
        let record = sqlx::query_as::<_, OverviewRecord>(
            "SELECT \
                (SELECT COUNT(*) FROM users) AS total_users, \
                (SELECT COUNT(*) FROM game_sessions) AS total_games, \
                (SELECT COUNT(*) FROM users WHERE (registered_at AT TIME ZONE 'UTC')::date = $1) AS new_users_today, \
                (SELECT COUNT(*) FROM game_sessions WHERE (created_at AT TIME ZONE 'UTC')::date = $1) AS games_today, \
                (SELECT AVG(score)::DOUBLE PRECISION FROM game_sessions) AS avg_score, \
                (SELECT MAX(score) FROM game_sessions) AS max_score",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_users(&self, limit: u32, offset: u64) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             ORDER BY registered_at DESC, user_id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_sessions(&self, limit: u32, offset: u64) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SessionSummaryRecord>(
            "SELECT s.id, s.user_id, s.score, s.level, s.coins_earned, s.duration_seconds, \
                    s.created_at, u.username, u.first_name \
             FROM game_sessions s \
             LEFT JOIN users u ON u.user_id = s.user_id \
             ORDER BY s.created_at DESC, s.id ASC LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn daily_analytics(&self, since: NaiveDate) -> PortResult<Vec<DailyAnalytics>> {
        let records = sqlx::query_as::<_, AnalyticsRecord>(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, \
                    COUNT(*) AS games_count, \
                    COUNT(DISTINCT user_id) AS unique_users, \
                    AVG(score)::DOUBLE PRECISION AS avg_score, \
                    MAX(score) AS max_score, \
                    SUM(coins_earned)::BIGINT AS total_coins \
             FROM game_sessions \
             WHERE (created_at AT TIME ZONE 'UTC')::date >= $1 \
             GROUP BY day \
             ORDER BY day DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `ProgressTransaction` Trait Implementation
//=========================================================================================

/// One submission's unit of work, backed by a single PostgreSQL transaction.
struct DbTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProgressTransaction for DbTransaction {
    async fn insert_user_if_absent(&mut self, user: &User) -> PortResult<bool> {
        let result = sqlx::query(
            "INSERT INTO users (user_id, username, first_name, last_name, registered_at, last_active_at, referrer_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.registered_at)
        .bind(user.last_active_at)
        .bind(&user.referrer_id)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_referral_if_absent(&mut self, referral: &Referral) -> PortResult<bool> {
        let result = sqlx::query(INSERT_REFERRAL)
            .bind(&referral.referred_id)
            .bind(&referral.referrer_id)
            .bind(referral.created_at)
            .bind(referral.bonus_applied)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() == 1)
    }

    async fn ensure_user(&mut self, user_id: &str, now: DateTime<Utc>) -> PortResult<()> {
        // Also takes the row lock that serializes concurrent submissions of the same user.
        sqlx::query(
            "INSERT INTO users (user_id, registered_at, last_active_at) VALUES ($1, $2, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 last_active_at = GREATEST(users.last_active_at, EXCLUDED.last_active_at)",
        )
        .bind(user_id)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_session(&mut self, session: &GameSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO game_sessions (id, user_id, score, level, coins_earned, duration_seconds, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(session.id)
        .bind(&session.user_id)
        .bind(session.score)
        .bind(session.level)
        .bind(session.coins_earned)
        .bind(session.duration_seconds)
        .bind(session.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_daily_stat(&mut self, session: &GameSession) -> PortResult<DailyStat> {
        let record = sqlx::query_as::<_, DailyStatRecord>(
            "INSERT INTO daily_stats (user_id, stat_date, games_played, total_score, total_coins, best_score, total_time) \
             VALUES ($1, $2, 1, $3, $4, $3, $5) \
             ON CONFLICT (user_id, stat_date) DO UPDATE SET \
                 games_played = daily_stats.games_played + 1, \
                 total_score = daily_stats.total_score + EXCLUDED.total_score, \
                 total_coins = daily_stats.total_coins + EXCLUDED.total_coins, \
                 best_score = GREATEST(daily_stats.best_score, EXCLUDED.best_score), \
                 total_time = daily_stats.total_time + EXCLUDED.total_time \
             RETURNING user_id, stat_date, games_played, total_score, total_coins, best_score, total_time",
        )
        .bind(&session.user_id)
        .bind(session.stat_date())
        .bind(session.score)
        .bind(session.coins_earned)
        .bind(session.duration_seconds)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn bump_lifetime_totals(&mut self, session: &GameSession) -> PortResult<LifetimeTotals> {
        let record = sqlx::query_as::<_, LifetimeRecord>(
            "UPDATE users SET \
                 total_games = total_games + 1, \
                 total_score = total_score + $2, \
                 total_coins = total_coins + $3, \
                 best_score = GREATEST(best_score, $2) \
             WHERE user_id = $1 \
             RETURNING total_games, total_score, total_coins, best_score",
        )
        .bind(&session.user_id)
        .bind(session.score)
        .bind(session.coins_earned)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", session.user_id)))?;
        Ok(record.to_domain())
    }

    async fn insert_achievement_if_absent(&mut self, achievement: &Achievement) -> PortResult<bool> {
        // A savepoint per award keeps one failed insert from poisoning the remaining ones.
        let mut savepoint = sqlx::Connection::begin(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        let result = sqlx::query(
            "INSERT INTO achievements (user_id, achievement_type, name, description, earned_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id, achievement_type) DO NOTHING",
        )
        .bind(&achievement.user_id)
        .bind(&achievement.achievement_type)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(achievement.earned_at)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(done) => {
                savepoint.commit().await.map_err(unexpected)?;
                Ok(done.rows_affected() == 1)
            }
            Err(e) => {
                savepoint.rollback().await.map_err(unexpected)?;
                Err(unexpected(e))
            }
        }
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(unexpected)
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        let this = *self;
        this.tx.rollback().await.map_err(unexpected)
    }
}
