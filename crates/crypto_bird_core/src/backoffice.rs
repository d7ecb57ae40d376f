//! crates/crypto_bird_core/src/backoffice.rs
//!
//! Read-only views for the operator dashboard.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use crate::domain::{DailyAnalytics, Overview, SessionSummary, User};
use crate::error::{CoreResult, ValidationError};
use crate::ports::ProgressStore;

/// Largest page size the store accepts.
pub const MAX_PAGE_LIMIT: i64 = u32::MAX as i64;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: i64, limit: i64) -> Self {
        Self { page, limit }
    }

    /// `(limit, offset)` for the store, or the violations of this request.
    fn bounds(&self) -> Result<(u32, u64), ValidationError> {
        let mut error = ValidationError::default();
        if self.page < 1 {
            error.push("page", "must be at least 1");
        }
        if self.limit < 1 {
            error.push("limit", "must be at least 1");
        } else if self.limit > MAX_PAGE_LIMIT {
            error.push("limit", format!("must be at most {MAX_PAGE_LIMIT}"));
        }
        error.into_result()?;
        Ok((
            self.limit as u32,
            ((self.page - 1) as u64).saturating_mul(self.limit as u64),
        ))
    }
}

#[derive(Clone)]
pub struct BackOffice {
    store: Arc<dyn ProgressStore>,
}

impl BackOffice {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    pub async fn overview(&self) -> CoreResult<Overview> {
        Ok(self.store.overview(Utc::now().date_naive()).await?)
    }

    pub async fn list_users(&self, page: Page) -> CoreResult<Vec<User>> {
        let (limit, offset) = page.bounds()?;
        Ok(self.store.list_users(limit, offset).await?)
    }

    pub async fn list_sessions(&self, page: Page) -> CoreResult<Vec<SessionSummary>> {
        let (limit, offset) = page.bounds()?;
        Ok(self.store.list_sessions(limit, offset).await?)
    }

    pub async fn daily_analytics(&self, days: i64) -> CoreResult<Vec<DailyAnalytics>> {
        self.daily_analytics_until(days, Utc::now().date_naive()).await
    }

    /// The last `days` calendar days ending with `today`, newest first.
    pub async fn daily_analytics_until(
        &self,
        days: i64,
        today: NaiveDate,
    ) -> CoreResult<Vec<DailyAnalytics>> {
        if !(1..=3650).contains(&days) {
            return Err(ValidationError::single("days", "must be between 1 and 3650").into());
        }
        let since = today - Duration::days(days - 1);
        Ok(self.store.daily_analytics(since).await?)
    }
}
