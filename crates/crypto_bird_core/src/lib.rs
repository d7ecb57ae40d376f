pub mod achievements;
pub mod backoffice;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod leaderboard;
pub mod memory;
pub mod pipeline;
pub mod ports;
pub mod referrals;
pub mod registration;
pub mod stats;

pub use achievements::{AchievementEngine, AchievementLog, AchievementRule, Trigger, RULES};
pub use backoffice::{BackOffice, Page};
pub use domain::{
    Achievement, DailyAnalytics, DailyStat, GameSession, LeaderboardEntry, LifetimeTotals,
    Overview, Referral, ReferralStats, RegistrationOutcome, SessionId, SessionOutcome,
    SessionSummary, User, UserProfile, UserStats,
};
pub use error::{CoreError, CoreResult, FieldViolation, ValidationError};
pub use ingest::{SessionIngestor, SessionSubmission, ValidSession};
pub use leaderboard::LeaderboardView;
pub use memory::InMemoryStore;
pub use pipeline::SubmissionPipeline;
pub use ports::{PortError, PortResult, ProgressStore, ProgressTransaction};
pub use referrals::{ReferralLedger, DEFAULT_BONUS_PER_REFERRAL};
pub use registration::Registrar;
pub use stats::{StatsAggregator, StatsUpdate};
