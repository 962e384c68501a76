//! Signal collectors: one bounded, filtered read per source type.
//!
//! Filtering and the row cap are applied in SQL. Collectors never score or
//! rank; they hand tagged raw rows to the engine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::normalize::MAX_STALE_DAYS;
use super::types::{RawRecord, SourceType};
use crate::db::{DbError, OpsDb};
use crate::error::SourceError;
use crate::types::SourceSettings;

/// Filter inputs for one collector call.
#[derive(Debug, Clone, Copy)]
pub struct CollectWindow {
    pub now: DateTime<Utc>,
    pub settings: SourceSettings,
}

impl CollectWindow {
    pub fn today(&self) -> String {
        self.now.date_naive().format("%Y-%m-%d").to_string()
    }

    /// `today` shifted by `days` (negative looks back).
    pub fn day_offset(&self, days: i64) -> String {
        (self.now.date_naive() + Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }
}

/// Bounded read for one source type.
#[async_trait]
pub trait SignalCollector: Send + Sync {
    async fn collect(
        &self,
        source: SourceType,
        window: &CollectWindow,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Run a read against a fresh read-only handle on the blocking pool.
pub(crate) async fn with_readonly_db<T, F>(db_path: &Path, f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce(&OpsDb) -> Result<T, DbError> + Send + 'static,
{
    let path = db_path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let db = OpsDb::open_readonly_at(&path)?;
        f(&db)
    })
    .await?;
    Ok(result?)
}

/// Collector backed by the operations store. Serves every built-in source.
#[derive(Debug, Clone)]
pub struct SqliteCollector {
    db_path: PathBuf,
}

impl SqliteCollector {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[async_trait]
impl SignalCollector for SqliteCollector {
    async fn collect(
        &self,
        source: SourceType,
        window: &CollectWindow,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let limit = window.settings.limit;
        let window_days = window.settings.window_days;
        let today = window.today();

        match source {
            SourceType::OverdueAction => {
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.get_overdue_actions(&today, limit)
                })
                .await?;
                Ok(rows.into_iter().map(RawRecord::Action).collect())
            }
            SourceType::UnansweredMessage => {
                let since = (window.now - Duration::days(window_days))
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.get_unanswered_communications(&since, limit)
                })
                .await?;
                Ok(rows.into_iter().map(RawRecord::Message).collect())
            }
            SourceType::UpcomingDeadline => {
                let until = window.day_offset(window_days);
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.get_upcoming_milestones(&today, &until, limit)
                })
                .await?;
                Ok(rows.into_iter().map(RawRecord::Deadline).collect())
            }
            SourceType::StaleRelationship => {
                let floor = window.day_offset(-MAX_STALE_DAYS);
                let threshold = window.day_offset(-window_days);
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.get_stale_contacts(&floor, &threshold, limit)
                })
                .await?;
                Ok(rows.into_iter().map(RawRecord::Contact).collect())
            }
            SourceType::GrantOpportunity => {
                let horizon = window.day_offset(window_days);
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.get_open_grants(&today, &horizon, limit)
                })
                .await?;
                Ok(rows.into_iter().map(RawRecord::Grant).collect())
            }
            SourceType::ServiceOpportunity => {
                let rows =
                    with_readonly_db(&self.db_path, move |db| db.get_open_service_deals(limit))
                        .await?;
                Ok(rows.into_iter().map(RawRecord::Service).collect())
            }
            SourceType::FundraisingOpportunity => {
                let rows =
                    with_readonly_db(&self.db_path, move |db| db.get_open_fundraising(limit))
                        .await?;
                Ok(rows.into_iter().map(RawRecord::Fundraising).collect())
            }
        }
    }
}
