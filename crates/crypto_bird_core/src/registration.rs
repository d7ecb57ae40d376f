//! crates/crypto_bird_core/src/registration.rs
//!
//! First contact and activity tracking for users, as driven by the front-ends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::domain::{RegistrationOutcome, User, UserProfile};
use crate::error::{CoreResult, ValidationError};
use crate::ports::{PortResult, ProgressStore, ProgressTransaction};
use crate::referrals::ReferralLedger;

#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn ProgressStore>,
    referrals: ReferralLedger,
}

impl Registrar {
    pub fn new(store: Arc<dyn ProgressStore>, referrals: ReferralLedger) -> Self {
        Self { store, referrals }
    }

    pub async fn register(
        &self,
        profile: UserProfile,
        referrer_id: Option<String>,
    ) -> CoreResult<RegistrationOutcome> {
        self.register_at(profile, referrer_id, Utc::now()).await
    }

    /// Creates the user if it has never been seen. A referral is only recorded for a
    /// user created by this call; re-registering never changes an existing referrer.
    ///
    /// The user row and its referral are written in one unit of work, so a failure leaves
    /// neither behind and the call can be retried.
    pub async fn register_at(
        &self,
        profile: UserProfile,
        referrer_id: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<RegistrationOutcome> {
        validate_identity(&profile)?;
        let referrer_id = referrer_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && *id != profile.user_id);

        let mut tx = self.store.begin().await?;
        let result = self
            .create(tx.as_mut(), &profile, referrer_id.as_deref(), now)
            .await;

        match result {
            Ok(Some(referral_recorded)) => {
                tx.commit().await?;
                info!(user_id = %profile.user_id, referrer_id = ?referrer_id, "User registered");
                Ok(RegistrationOutcome {
                    created: true,
                    referral_recorded,
                })
            }
            Ok(None) => {
                tx.rollback().await?;
                self.store.touch_user(&profile, now).await?;
                Ok(RegistrationOutcome {
                    created: false,
                    referral_recorded: false,
                })
            }
            Err(e) => {
                error!(user_id = %profile.user_id, referrer_id = ?referrer_id, error = %e, "Registration failed");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed registration also failed");
                }
                Err(e.into())
            }
        }
    }

    /// `None` when the user already exists; otherwise whether a referral was recorded.
    async fn create(
        &self,
        tx: &mut dyn ProgressTransaction,
        profile: &UserProfile,
        referrer_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<bool>> {
        let user = User::first_contact(profile, referrer_id.map(str::to_string), now);
        if !tx.insert_user_if_absent(&user).await? {
            return Ok(None);
        }
        let recorded = match referrer_id {
            Some(referrer) => {
                self.referrals
                    .record_referral_in(tx, referrer, &profile.user_id, now)
                    .await?
            }
            None => false,
        };
        Ok(Some(recorded))
    }

    /// Refreshes activity and display fields, creating the user on first contact.
    pub async fn touch(&self, profile: UserProfile) -> CoreResult<()> {
        validate_identity(&profile)?;
        Ok(self.store.touch_user(&profile, Utc::now()).await?)
    }

    pub async fn get_user(&self, user_id: &str) -> CoreResult<User> {
        Ok(self.store.get_user(user_id).await?)
    }
}

fn validate_identity(profile: &UserProfile) -> Result<(), ValidationError> {
    if profile.user_id.trim().is_empty() {
        return Err(ValidationError::single("user_id", "must not be empty"));
    }
    Ok(())
}
