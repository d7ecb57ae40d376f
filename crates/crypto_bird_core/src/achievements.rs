//! crates/crypto_bird_core/src/achievements.rs
//!
//! The fixed achievement rule set and the engine that awards it.
//!
//! Rules are plain data evaluated uniformly against the post-update aggregates of a
//! submission. Awarding is a conditional insert on (user, achievement type); the
//! store's uniqueness constraint is the only thing that makes re-evaluation
//! idempotent, so there is deliberately no record of "already checked" thresholds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::Achievement;
use crate::error::CoreResult;
use crate::ports::{PortError, PortResult, ProgressStore, ProgressTransaction};

/// What has to be true for a rule to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The submission was the user's first game ever.
    FirstGame,
    /// The submitted session scored at least this much.
    ScoreAtLeast(i64),
    /// The user's lifetime game count reached at least this many.
    GamesAtLeast(i64),
}

/// The progress a rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub latest_score: i64,
    pub lifetime_games: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AchievementRule {
    pub achievement_type: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub trigger: Trigger,
}

impl AchievementRule {
    pub fn is_met(&self, progress: Progress) -> bool {
        match self.trigger {
            Trigger::FirstGame => progress.lifetime_games == 1,
            Trigger::ScoreAtLeast(threshold) => progress.latest_score >= threshold,
            Trigger::GamesAtLeast(threshold) => progress.lifetime_games >= threshold,
        }
    }

    pub fn award_to(&self, user_id: &str, now: DateTime<Utc>) -> Achievement {
        Achievement {
            user_id: user_id.to_string(),
            achievement_type: self.achievement_type.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            earned_at: now,
        }
    }
}

/// Evaluation order: first game, then score milestones ascending, then volume milestones ascending.
pub const RULES: [AchievementRule; 9] = [
    AchievementRule {
        achievement_type: "first_game",
        name: "First Flight",
        description: "Played Crypto Bird for the first time!",
        trigger: Trigger::FirstGame,
    },
    AchievementRule {
        achievement_type: "score_100",
        name: "Newcomer",
        description: "Scored 100 points",
        trigger: Trigger::ScoreAtLeast(100),
    },
    AchievementRule {
        achievement_type: "score_500",
        name: "Seasoned Player",
        description: "Scored 500 points",
        trigger: Trigger::ScoreAtLeast(500),
    },
    AchievementRule {
        achievement_type: "score_1000",
        name: "Master",
        description: "Scored 1000 points",
        trigger: Trigger::ScoreAtLeast(1000),
    },
    AchievementRule {
        achievement_type: "score_2500",
        name: "Expert",
        description: "Scored 2500 points",
        trigger: Trigger::ScoreAtLeast(2500),
    },
    AchievementRule {
        achievement_type: "score_5000",
        name: "Legend",
        description: "Scored 5000 points",
        trigger: Trigger::ScoreAtLeast(5000),
    },
    AchievementRule {
        achievement_type: "games_10",
        name: "Regular",
        description: "Played 10 games",
        trigger: Trigger::GamesAtLeast(10),
    },
    AchievementRule {
        achievement_type: "games_50",
        name: "Fan",
        description: "Played 50 games",
        trigger: Trigger::GamesAtLeast(50),
    },
    AchievementRule {
        achievement_type: "games_100",
        name: "Devoted Player",
        description: "Played 100 games",
        trigger: Trigger::GamesAtLeast(100),
    },
];

/// Rules whose trigger holds for `progress`, in evaluation order.
pub fn rules_met(progress: Progress) -> impl Iterator<Item = &'static AchievementRule> {
    RULES.iter().filter(move |rule| rule.is_met(progress))
}

pub fn rule_for(achievement_type: &str) -> Option<&'static AchievementRule> {
    RULES.iter().find(|rule| rule.achievement_type == achievement_type)
}

/// Awards achievements inside a submission's unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct AchievementEngine;

impl AchievementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates every rule and returns the achievements that were newly awarded, in rule order.
    ///
    /// A failed insert does not stop the remaining rules from being attempted; the first
    /// failure is returned once all rules have run.
    pub async fn evaluate(
        &self,
        tx: &mut dyn ProgressTransaction,
        user_id: &str,
        latest_score: i64,
        lifetime_games: i64,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<Achievement>> {
        let progress = Progress {
            latest_score,
            lifetime_games,
        };
        let mut awarded = Vec::new();
        let mut first_failure: Option<PortError> = None;

        for rule in rules_met(progress) {
            let achievement = rule.award_to(user_id, now);
            match tx.insert_achievement_if_absent(&achievement).await {
                Ok(true) => {
                    info!(user_id, achievement = rule.achievement_type, "Achievement awarded");
                    awarded.push(achievement);
                }
                Ok(false) => {
                    debug!(user_id, achievement = rule.achievement_type, "Achievement already held");
                }
                Err(e) => {
                    warn!(user_id, achievement = rule.achievement_type, error = %e, "Failed to award achievement");
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(awarded),
        }
    }
}

/// Read side of the awarded achievements.
#[derive(Clone)]
pub struct AchievementLog {
    store: Arc<dyn ProgressStore>,
}

impl AchievementLog {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Everything the user holds, most recent first. Unknown users hold nothing.
    pub async fn list_for(&self, user_id: &str) -> CoreResult<Vec<Achievement>> {
        Ok(self.store.get_achievements_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::ports::ProgressStore;

    fn types(progress: Progress) -> Vec<&'static str> {
        rules_met(progress).map(|r| r.achievement_type).collect()
    }

    #[test]
    fn rule_types_match_their_thresholds() {
        for rule in RULES.iter() {
            match rule.trigger {
                Trigger::FirstGame => assert_eq!(rule.achievement_type, "first_game"),
                Trigger::ScoreAtLeast(n) => assert_eq!(rule.achievement_type, format!("score_{n}")),
                Trigger::GamesAtLeast(n) => assert_eq!(rule.achievement_type, format!("games_{n}")),
            }
        }
    }

    #[test]
    fn rule_types_are_unique() {
        let mut seen: Vec<_> = RULES.iter().map(|r| r.achievement_type).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), RULES.len());
    }

    #[test]
    fn first_game_fires_only_on_the_first_game() {
        assert_eq!(types(Progress { latest_score: 0, lifetime_games: 1 }), vec!["first_game"]);
        assert!(types(Progress { latest_score: 0, lifetime_games: 2 }).is_empty());
    }

    #[test]
    fn big_jump_crosses_several_score_milestones_in_order() {
        assert_eq!(
            types(Progress { latest_score: 3000, lifetime_games: 2 }),
            vec!["score_100", "score_500", "score_1000", "score_2500"]
        );
    }

    #[test]
    fn score_and_volume_milestones_are_independent() {
        assert_eq!(
            types(Progress { latest_score: 0, lifetime_games: 50 }),
            vec!["games_10", "games_50"]
        );
        assert_eq!(
            types(Progress { latest_score: 5000, lifetime_games: 100 }),
            vec![
                "score_100", "score_500", "score_1000", "score_2500", "score_5000",
                "games_10", "games_50", "games_100"
            ]
        );
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(types(Progress { latest_score: 99, lifetime_games: 9 }), Vec::<&str>::new());
        assert_eq!(
            types(Progress { latest_score: 100, lifetime_games: 10 }),
            vec!["score_100", "games_10"]
        );
    }

    #[test]
    fn rule_lookup_by_type() {
        assert_eq!(rule_for("games_50").map(|r| r.name), Some("Fan"));
        assert!(rule_for("games_1000").is_none());
    }

    #[tokio::test]
    async fn evaluating_twice_never_awards_twice() {
        let store = InMemoryStore::new();
        let engine = AchievementEngine::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.ensure_user("u1", now).await.unwrap();
        let first = engine.evaluate(tx.as_mut(), "u1", 600, 1, now).await.unwrap();
        let second = engine.evaluate(tx.as_mut(), "u1", 600, 1, now).await.unwrap();
        tx.commit().await.unwrap();

        let first: Vec<_> = first.iter().map(|a| a.achievement_type.as_str()).collect();
        assert_eq!(first, vec!["first_game", "score_100", "score_500"]);
        assert!(second.is_empty());
        assert_eq!(store.get_achievements_for_user("u1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn a_failed_award_does_not_stop_the_others() {
        let store = InMemoryStore::new().with_failing_awards(["score_100"]);
        let engine = AchievementEngine::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.ensure_user("u1", now).await.unwrap();
        let result = engine.evaluate(tx.as_mut(), "u1", 500, 1, now).await;
        assert!(matches!(result, Err(PortError::Unexpected(_))));
        tx.commit().await.unwrap();

        let mut held: Vec<_> = store
            .get_achievements_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.achievement_type)
            .collect();
        held.sort();
        assert_eq!(held, vec!["first_game", "score_500"]);
    }

    #[tokio::test]
    async fn log_lists_latest_awards_first() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AchievementEngine::new();
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let later = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.ensure_user("u1", earlier).await.unwrap();
        engine.evaluate(tx.as_mut(), "u1", 0, 1, earlier).await.unwrap();
        engine.evaluate(tx.as_mut(), "u1", 500, 2, later).await.unwrap();
        tx.commit().await.unwrap();

        let log = AchievementLog::new(store);
        let listed: Vec<_> = log
            .list_for("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.achievement_type)
            .collect();
        assert_eq!(listed, vec!["score_500", "score_100", "first_game"]);
        assert!(log.list_for("nobody").await.unwrap().is_empty());
    }
}
