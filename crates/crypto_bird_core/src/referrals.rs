//! crates/crypto_bird_core/src/referrals.rs
//!
//! One-time referrer → referred links and the bonus derived from them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{Referral, ReferralStats};
use crate::error::CoreResult;
use crate::ports::{PortResult, ProgressStore, ProgressTransaction};

/// Bonus units credited per referred user unless configured otherwise.
pub const DEFAULT_BONUS_PER_REFERRAL: i64 = 100;

#[derive(Clone)]
pub struct ReferralLedger {
    store: Arc<dyn ProgressStore>,
    bonus_per_referral: i64,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self::with_bonus(store, DEFAULT_BONUS_PER_REFERRAL)
    }

    pub fn with_bonus(store: Arc<dyn ProgressStore>, bonus_per_referral: i64) -> Self {
        Self {
            store,
            bonus_per_referral,
        }
    }

    pub async fn record_referral(&self, referrer_id: &str, referred_id: &str) -> CoreResult<bool> {
        self.record_referral_at(referrer_id, referred_id, Utc::now()).await
    }

    /// Links `referred_id` to `referrer_id`. Returns `false` without touching anything when
    /// the referred user already has a referrer, or when someone tries to refer themselves.
    pub async fn record_referral_at(
        &self,
        referrer_id: &str,
        referred_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let Some(referral) = link(referrer_id, referred_id, now) else {
            return Ok(false);
        };
        let recorded = self.store.insert_referral_if_absent(&referral).await?;
        log_outcome(&referral, recorded);
        Ok(recorded)
    }

    /// Same as [`Self::record_referral_at`], inside a caller's unit of work.
    pub async fn record_referral_in(
        &self,
        tx: &mut dyn ProgressTransaction,
        referrer_id: &str,
        referred_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<bool> {
        let Some(referral) = link(referrer_id, referred_id, now) else {
            return Ok(false);
        };
        let recorded = tx.insert_referral_if_absent(&referral).await?;
        log_outcome(&referral, recorded);
        Ok(recorded)
    }

    pub async fn count_for(&self, referrer_id: &str) -> CoreResult<i64> {
        Ok(self.store.count_referrals(referrer_id).await?)
    }

    pub async fn bonus_for(&self, referrer_id: &str) -> CoreResult<i64> {
        Ok(self.bonus_for_count(self.count_for(referrer_id).await?))
    }

    pub async fn stats_for(&self, referrer_id: &str) -> CoreResult<ReferralStats> {
        let referral_count = self.count_for(referrer_id).await?;
        Ok(ReferralStats {
            referral_count,
            bonus_amount: self.bonus_for_count(referral_count),
            bonus_active: referral_count > 0,
        })
    }

    fn bonus_for_count(&self, count: i64) -> i64 {
        count * self.bonus_per_referral
    }
}

fn link(referrer_id: &str, referred_id: &str, now: DateTime<Utc>) -> Option<Referral> {
    let referrer_id = referrer_id.trim();
    if referrer_id.is_empty() || referrer_id == referred_id {
        debug!(referrer_id, referred_id, "Ignoring referral");
        return None;
    }
    Some(Referral {
        referrer_id: referrer_id.to_string(),
        referred_id: referred_id.to_string(),
        created_at: now,
        bonus_applied: false,
    })
}

fn log_outcome(referral: &Referral, recorded: bool) {
    let (referrer_id, referred_id) = (referral.referrer_id.as_str(), referral.referred_id.as_str());
    if recorded {
        info!(referrer_id, referred_id, "Referral recorded");
    } else {
        debug!(referrer_id, referred_id, "Referred user already has a referrer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn first_referrer_wins() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ReferralLedger::new(store.clone());

        assert!(ledger.record_referral("A", "X").await.unwrap());
        assert!(!ledger.record_referral("B", "X").await.unwrap());

        assert_eq!(store.get_referral_for("X").await.unwrap().referrer_id, "A");
        assert_eq!(ledger.count_for("A").await.unwrap(), 1);
        assert_eq!(ledger.count_for("B").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_and_blank_referrals_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ReferralLedger::new(store.clone());

        assert!(!ledger.record_referral("X", "X").await.unwrap());
        assert!(!ledger.record_referral("  ", "X").await.unwrap());
        assert!(store.get_referral_for("X").await.is_err());
    }

    #[tokio::test]
    async fn bonus_scales_with_count() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ReferralLedger::new(store.clone());
        for referred in ["r1", "r2", "r3"] {
            ledger.record_referral("A", referred).await.unwrap();
        }

        assert_eq!(ledger.bonus_for("A").await.unwrap(), 300);
        assert_eq!(
            ledger.stats_for("A").await.unwrap(),
            ReferralStats {
                referral_count: 3,
                bonus_amount: 300,
                bonus_active: true
            }
        );
        assert!(!ledger.stats_for("nobody").await.unwrap().bonus_active);
    }

    #[tokio::test]
    async fn configured_bonus_is_used() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ReferralLedger::with_bonus(store, 25);
        ledger.record_referral("A", "r1").await.unwrap();
        assert_eq!(ledger.bonus_for("A").await.unwrap(), 25);
    }
}
