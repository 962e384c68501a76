//! Unified opportunities: grants, service deals and fundraising prospects
//! ranked by fit, then nearest deadline.

use chrono::{DateTime, Utc};

use super::{run_feed, FeedQuery};
use crate::error::FeedError;
use crate::signals::{Feed, FeedKind, SourceType};
use crate::state::AppState;

pub const OPPORTUNITY_SOURCES: [SourceType; 3] = [
    SourceType::GrantOpportunity,
    SourceType::ServiceOpportunity,
    SourceType::FundraisingOpportunity,
];

pub async fn get_opportunities(
    state: &AppState,
    query: &FeedQuery,
    now: DateTime<Utc>,
) -> Result<Feed, FeedError> {
    let feed = run_feed(state, FeedKind::Opportunity, &OPPORTUNITY_SOURCES, query, now).await?;
    if !feed.errors.is_empty() {
        log::info!(
            "Opportunities served with {} degraded branch(es)",
            feed.errors.len()
        );
    }
    Ok(feed)
}
