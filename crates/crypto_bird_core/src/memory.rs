//! crates/crypto_bird_core/src/memory.rs
//!
//! An in-process implementation of the store ports, for tests and local runs.
//!
//! A transaction takes the store's lock for its whole lifetime and works on a copy of
//! the state, which replaces the shared state only on commit. Units of work are
//! therefore fully serialized, and an abandoned transaction leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{
    Achievement, DailyAnalytics, DailyStat, GameSession, LifetimeTotals, Overview, Referral,
    SessionSummary, User, UserProfile, UserStats,
};
use crate::ports::{PortError, PortResult, ProgressStore, ProgressTransaction};

#[derive(Debug, Clone, Default)]
struct State {
    users: BTreeMap<String, User>,
    sessions: Vec<GameSession>,
    daily: BTreeMap<(String, NaiveDate), DailyStat>,
    achievements: Vec<Achievement>,
    referrals: BTreeMap<String, Referral>,
}

/// Writes that are made to fail on purpose.
#[derive(Debug, Default)]
struct Faults {
    awards: HashSet<String>,
    referrals: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert of the given achievement types fail, to exercise error paths.
    pub fn with_failing_awards<I, S>(mut self, achievement_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.faults = Arc::new(Faults {
            awards: achievement_types.into_iter().map(Into::into).collect(),
            referrals: self.faults.referrals,
        });
        self
    }

    /// Makes every referral insert fail.
    pub fn with_failing_referrals(mut self) -> Self {
        self.faults = Arc::new(Faults {
            awards: self.faults.awards.clone(),
            referrals: true,
        });
        self
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

fn not_found(what: impl std::fmt::Display) -> PortError {
    PortError::NotFound(what.to_string())
}

fn overflow(user_id: &str) -> PortError {
    PortError::Unexpected(format!("counter overflow for user {}", user_id))
}

fn referral_fault(faults: &Faults, referral: &Referral) -> PortResult<()> {
    if faults.referrals {
        return Err(PortError::Unexpected(format!(
            "injected failure linking {} to {}",
            referral.referred_id, referral.referrer_id
        )));
    }
    Ok(())
}

fn insert_referral(state: &mut State, referral: &Referral) -> bool {
    if state.referrals.contains_key(&referral.referred_id) {
        return false;
    }
    state
        .referrals
        .insert(referral.referred_id.clone(), referral.clone());
    true
}

#[async_trait]
impl ProgressStore for InMemoryStore {
    async fn begin(&self) -> PortResult<Box<dyn ProgressTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn touch_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .entry(profile.user_id.clone())
            .or_insert_with(|| User::first_contact(profile, None, now));
        user.username = profile.username.clone();
        user.first_name = profile.first_name.clone();
        user.last_name = profile.last_name.clone();
        user.last_active_at = now;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> PortResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found(format!("User {} not found", user_id)))
    }

    async fn get_user_stats(&self, user_id: &str) -> PortResult<UserStats> {
        let state = self.state.lock().await;
        if !state.users.contains_key(user_id) {
            return Err(not_found(format!("User {} not found", user_id)));
        }
        let (mut games, mut best, mut score, mut coins) = (0, 0, 0, 0);
        for stat in state.daily.values().filter(|d| d.user_id == user_id) {
            games += stat.games_played;
            best = best.max(stat.best_score);
            score += stat.total_score;
            coins += stat.total_coins;
        }
        Ok(UserStats::from_sums(games, best, score, coins))
    }

    async fn get_daily_stat(&self, user_id: &str, date: NaiveDate) -> PortResult<DailyStat> {
        let state = self.state.lock().await;
        state
            .daily
            .get(&(user_id.to_string(), date))
            .cloned()
            .ok_or_else(|| not_found(format!("No stats for user {} on {}", user_id, date)))
    }

    async fn top_players(&self, limit: u32) -> PortResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| {
            b.totals
                .best_score
                .cmp(&a.totals.best_score)
                .then(a.registered_at.cmp(&b.registered_at))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn get_achievements_for_user(&self, user_id: &str) -> PortResult<Vec<Achievement>> {
        let state = self.state.lock().await;
        // Reverse insertion order first so awards sharing a timestamp list the latest rule first.
        let mut held: Vec<Achievement> = state
            .achievements
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        held.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        Ok(held)
    }

    async fn insert_referral_if_absent(&self, referral: &Referral) -> PortResult<bool> {
        referral_fault(&self.faults, referral)?;
        let mut state = self.state.lock().await;
        Ok(insert_referral(&mut state, referral))
    }

    async fn count_referrals(&self, referrer_id: &str) -> PortResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id)
            .count() as i64)
    }

    async fn get_referral_for(&self, referred_id: &str) -> PortResult<Referral> {
        let state = self.state.lock().await;
        state
            .referrals
            .get(referred_id)
            .cloned()
            .ok_or_else(|| not_found(format!("No referral for user {}", referred_id)))
    }

    async fn overview(&self, today: NaiveDate) -> PortResult<Overview> {
        let state = self.state.lock().await;
        let total_games = state.sessions.len() as i64;
        let total_score: i64 = state.sessions.iter().map(|s| s.score).sum();
        Ok(Overview {
            total_users: state.users.len() as i64,
            total_games,
            new_users_today: state
                .users
                .values()
                .filter(|u| u.registered_at.date_naive() == today)
                .count() as i64,
            games_today: state
                .sessions
                .iter()
                .filter(|s| s.stat_date() == today)
                .count() as i64,
            avg_score: (total_games > 0).then(|| total_score as f64 / total_games as f64),
            max_score: state.sessions.iter().map(|s| s.score).max(),
        })
    }

    async fn list_users(&self, limit: u32, offset: u64) -> PortResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_sessions(&self, limit: u32, offset: u64) -> PortResult<Vec<SessionSummary>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<&GameSession> = state.sessions.iter().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|session| SessionSummary {
                display_name: state
                    .users
                    .get(&session.user_id)
                    .and_then(|u| u.display_name().map(str::to_string)),
                session: session.clone(),
            })
            .collect())
    }

    async fn daily_analytics(&self, since: NaiveDate) -> PortResult<Vec<DailyAnalytics>> {
        let state = self.state.lock().await;
        let mut days: BTreeMap<NaiveDate, Vec<&GameSession>> = BTreeMap::new();
        for session in state.sessions.iter().filter(|s| s.stat_date() >= since) {
            days.entry(session.stat_date()).or_default().push(session);
        }
        Ok(days
            .into_iter()
            .rev()
            .map(|(date, sessions)| {
                let games_count = sessions.len() as i64;
                let total_score: i64 = sessions.iter().map(|s| s.score).sum();
                let unique_users: BTreeSet<&str> =
                    sessions.iter().map(|s| s.user_id.as_str()).collect();
                DailyAnalytics {
                    date,
                    games_count,
                    unique_users: unique_users.len() as i64,
                    avg_score: total_score as f64 / games_count as f64,
                    max_score: sessions.iter().map(|s| s.score).max().unwrap_or(0),
                    total_coins: sessions.iter().map(|s| s.coins_earned).sum(),
                }
            })
            .collect())
    }
}

//=========================================================================================
// Transaction
//=========================================================================================

struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
    faults: Arc<Faults>,
}

impl MemoryTransaction {
    fn user_mut(&mut self, user_id: &str) -> PortResult<&mut User> {
        self.working
            .users
            .get_mut(user_id)
            .ok_or_else(|| not_found(format!("User {} not found", user_id)))
    }
}

#[async_trait]
impl ProgressTransaction for MemoryTransaction {
    async fn ensure_user(&mut self, user_id: &str, now: DateTime<Utc>) -> PortResult<()> {
        self.working
            .users
            .entry(user_id.to_string())
            .and_modify(|u| u.last_active_at = now)
            .or_insert_with(|| User::first_contact(&UserProfile::bare(user_id), None, now));
        Ok(())
    }

    async fn insert_user_if_absent(&mut self, user: &User) -> PortResult<bool> {
        if self.working.users.contains_key(&user.user_id) {
            return Ok(false);
        }
        self.working.users.insert(user.user_id.clone(), user.clone());
        Ok(true)
    }

    async fn insert_referral_if_absent(&mut self, referral: &Referral) -> PortResult<bool> {
        referral_fault(&self.faults, referral)?;
        Ok(insert_referral(&mut self.working, referral))
    }

    async fn insert_session(&mut self, session: &GameSession) -> PortResult<()> {
        self.user_mut(&session.user_id)?;
        self.working.sessions.push(session.clone());
        Ok(())
    }

    async fn upsert_daily_stat(&mut self, session: &GameSession) -> PortResult<DailyStat> {
        let key = (session.user_id.clone(), session.stat_date());
        let updated = match self.working.daily.get(&key) {
            Some(stat) => stat
                .absorbing(session)
                .ok_or_else(|| overflow(&session.user_id))?,
            None => DailyStat::seeded_from(session),
        };
        self.working.daily.insert(key, updated.clone());
        Ok(updated)
    }

    async fn bump_lifetime_totals(&mut self, session: &GameSession) -> PortResult<LifetimeTotals> {
        let user = self.user_mut(&session.user_id)?;
        let totals = user
            .totals
            .counting(session)
            .ok_or_else(|| overflow(&session.user_id))?;
        user.totals = totals;
        user.last_active_at = session.created_at;
        Ok(totals)
    }

    async fn insert_achievement_if_absent(&mut self, achievement: &Achievement) -> PortResult<bool> {
        if self.faults.awards.contains(&achievement.achievement_type) {
            return Err(PortError::Unexpected(format!(
                "injected failure awarding {}",
                achievement.achievement_type
            )));
        }
        let held = self.working.achievements.iter().any(|a| {
            a.user_id == achievement.user_id && a.achievement_type == achievement.achievement_type
        });
        if held {
            return Ok(false);
        }
        self.working.achievements.push(achievement.clone());
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let MemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        Ok(())
    }
}
