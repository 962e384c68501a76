//! Feed services: wire the engine to the operations store and config.

pub mod inbox;
pub mod opportunities;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::FeedError;
use crate::signals::{
    builtin_rule, Feed, FeedKind, FeedRequest, SignalCollector, SignalEngine, SourceType,
    SqliteCollector, SqliteContextProvider,
};
use crate::state::AppState;

/// Caller-supplied feed parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
    /// Project code; keeps only signals in that group.
    pub project: Option<String>,
}

/// Engine over the operations store with the built-in rule for each source.
pub fn build_engine(state: &AppState, feed: FeedKind, sources: &[SourceType]) -> SignalEngine {
    let collector: Arc<dyn SignalCollector> = Arc::new(SqliteCollector::new(&state.db_path));
    let joiner = Arc::new(SqliteContextProvider::new(&state.db_path));
    let mut engine = SignalEngine::new(feed, joiner, state.config.enrichment.timeout_secs)
        .with_project_keywords(state.config.project_keywords.clone());
    for source in sources {
        engine.register(
            builtin_rule(*source),
            Arc::clone(&collector),
            state.config.sources.settings(*source),
        );
    }
    engine
}

pub(crate) async fn run_feed(
    state: &AppState,
    feed: FeedKind,
    sources: &[SourceType],
    query: &FeedQuery,
    now: DateTime<Utc>,
) -> Result<Feed, FeedError> {
    if !state.db_path.exists() {
        return Err(FeedError::StoreUnavailable(format!(
            "no database at {}",
            state.db_path.display()
        )));
    }

    let engine = build_engine(state, feed, sources);
    let request = FeedRequest {
        now,
        limit: state.config.feed.clamp_limit(query.limit),
        group_key: query
            .project
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string),
    };
    engine.aggregate(&request).await
}
