//! Aggregation engine.
//!
//! Holds a registry of sources. Each entry bundles a collector, the context
//! types its records need, a normalizer and a scoring rule. One aggregate
//! request runs in four steps:
//!
//! 1. every collector concurrently, each under its own timeout;
//! 2. one joiner call per context type, concurrently, keyed by the union of
//!    entity ids across batches that declared that type;
//! 3. normalize + score each record (pure, synchronous);
//! 4. merge/rank into one bounded feed.
//!
//! A failed or timed-out branch becomes an empty batch plus an entry in
//! `Feed::errors`. Nothing is cached between requests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::collectors::{CollectWindow, SignalCollector};
use super::enrichment::{ContextMaps, ContextProvider, ContextType};
use super::normalize::{self, NormalizeEnv, NormalizeFn};
use super::ranking::{merge, Feed};
use super::scoring::{self, ScoreFn};
use super::types::{FeedKind, RawRecord, Signal, SourceType};
use crate::error::{FeedError, SourceError, SourceFailure};
use crate::types::SourceSettings;

/// Slack on top of the summed phase timeouts for normalize and merge.
const REQUEST_GRACE: Duration = Duration::from_secs(1);

/// How records of one source type are enriched, normalized and scored.
#[derive(Clone, Copy)]
pub struct SourceRule {
    pub source: SourceType,
    pub contexts: &'static [ContextType],
    pub normalize: NormalizeFn,
    pub score: ScoreFn,
}

impl std::fmt::Debug for SourceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRule")
            .field("source", &self.source)
            .field("contexts", &self.contexts)
            .finish()
    }
}

/// Built-in rule for each source type.
pub fn builtin_rule(source: SourceType) -> SourceRule {
    use ContextType::*;
    let (contexts, normalize, score): (&'static [ContextType], NormalizeFn, ScoreFn) =
        match source {
            SourceType::OverdueAction => (
                &[LastCommunication],
                normalize::normalize_overdue_action,
                scoring::overdue_action_rule,
            ),
            SourceType::UnansweredMessage => (
                &[RelationshipHealth],
                normalize::normalize_unanswered_message,
                scoring::unanswered_message_rule,
            ),
            SourceType::UpcomingDeadline => (
                &[],
                normalize::normalize_upcoming_deadline,
                scoring::upcoming_deadline_rule,
            ),
            SourceType::StaleRelationship => (
                &[RelationshipHealth, PipelineTotals, LastCommunication],
                normalize::normalize_stale_relationship,
                scoring::stale_relationship_rule,
            ),
            SourceType::GrantOpportunity => (
                &[LastCommunication],
                normalize::normalize_grant,
                scoring::opportunity_rule,
            ),
            SourceType::ServiceOpportunity => (
                &[RelationshipHealth, PipelineTotals],
                normalize::normalize_service,
                scoring::opportunity_rule,
            ),
            SourceType::FundraisingOpportunity => (
                &[RelationshipHealth, LastCommunication],
                normalize::normalize_fundraising,
                scoring::opportunity_rule,
            ),
        };
    SourceRule {
        source,
        contexts,
        normalize,
        score,
    }
}

/// A registered source.
pub struct SourceEntry {
    pub rule: SourceRule,
    pub collector: Arc<dyn SignalCollector>,
    pub settings: SourceSettings,
}

/// Parameters of one aggregate request.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub now: DateTime<Utc>,
    pub limit: usize,
    /// Keep only signals whose `groupKey` equals this.
    pub group_key: Option<String>,
}

pub struct SignalEngine {
    feed: FeedKind,
    entries: Vec<SourceEntry>,
    joiner: Arc<dyn ContextProvider>,
    enrichment_timeout_secs: u64,
    project_keywords: BTreeMap<String, Vec<String>>,
}

impl SignalEngine {
    pub fn new(feed: FeedKind, joiner: Arc<dyn ContextProvider>, enrichment_timeout_secs: u64) -> Self {
        Self {
            feed,
            entries: Vec::new(),
            joiner,
            enrichment_timeout_secs,
            project_keywords: BTreeMap::new(),
        }
    }

    pub fn with_project_keywords(mut self, keywords: BTreeMap<String, Vec<String>>) -> Self {
        self.project_keywords = keywords;
        self
    }

    /// Register a source. Re-registering a source type replaces the earlier
    /// entry in place.
    pub fn register(
        &mut self,
        rule: SourceRule,
        collector: Arc<dyn SignalCollector>,
        settings: SourceSettings,
    ) {
        let entry = SourceEntry {
            rule,
            collector,
            settings,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.rule.source == rule.source)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Registered source types, in registration order.
    pub fn sources(&self) -> Vec<SourceType> {
        self.entries.iter().map(|e| e.rule.source).collect()
    }

    /// Guard for a whole request: the slowest collector plus the joiner
    /// timeout, since the two phases run one after the other.
    pub fn request_timeout(&self) -> Duration {
        let collect_secs = self
            .entries
            .iter()
            .map(|e| e.settings.timeout_secs)
            .max()
            .unwrap_or(0);
        Duration::from_secs(collect_secs.saturating_add(self.enrichment_timeout_secs))
            .saturating_add(REQUEST_GRACE)
    }

    pub async fn aggregate(&self, request: &FeedRequest) -> Result<Feed, FeedError> {
        if self.entries.is_empty() {
            return Err(FeedError::NoSources);
        }
        let guard = self.request_timeout();
        tokio::time::timeout(guard, self.run(request))
            .await
            .map_err(|_| FeedError::Timeout(guard.as_secs()))
    }

    async fn run(&self, request: &FeedRequest) -> Feed {
        let started = Instant::now();
        let mut errors = Vec::new();

        let batches = self.collect_all(request.now, &mut errors).await;
        let contexts = self.join_all_contexts(&batches, request.now, &mut errors).await;

        let env = NormalizeEnv {
            now: request.now,
            project_keywords: &self.project_keywords,
        };
        let signals: Vec<Vec<Signal>> = self
            .entries
            .iter()
            .zip(batches.iter())
            .map(|(entry, records)| {
                records
                    .iter()
                    .filter_map(|raw| {
                        build_signal(entry.rule, raw, &contexts, &env, request.group_key.as_deref())
                    })
                    .collect()
            })
            .collect();

        let (items, counts) = merge(signals, self.feed, &self.sources(), request.limit);
        log::debug!(
            "{:?} feed: {} of {} signals, {} branch errors, {}ms",
            self.feed,
            items.len(),
            counts.total,
            errors.len(),
            started.elapsed().as_millis()
        );

        Feed {
            items,
            counts,
            errors,
            error: None,
        }
    }

    async fn collect_all(
        &self,
        now: DateTime<Utc>,
        errors: &mut Vec<SourceFailure>,
    ) -> Vec<Vec<RawRecord>> {
        let branches = self.entries.iter().map(|entry| async move {
            let window = CollectWindow {
                now,
                settings: entry.settings,
            };
            let secs = entry.settings.timeout_secs;
            match tokio::time::timeout(
                Duration::from_secs(secs),
                entry.collector.collect(entry.rule.source, &window),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(secs)),
            }
        });

        let results = join_all(branches).await;
        self.entries
            .iter()
            .zip(results)
            .map(|(entry, result)| match result {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Collector {} failed: {}", entry.rule.source, e);
                    errors.push(SourceFailure::new(entry.rule.source.as_str(), &e));
                    Vec::new()
                }
            })
            .collect()
    }

    async fn join_all_contexts(
        &self,
        batches: &[Vec<RawRecord>],
        now: DateTime<Utc>,
        errors: &mut Vec<SourceFailure>,
    ) -> ContextMaps {
        let mut wanted: BTreeMap<ContextType, BTreeSet<String>> = BTreeMap::new();
        for (entry, records) in self.entries.iter().zip(batches) {
            for context in entry.rule.contexts {
                let ids = wanted.entry(*context).or_default();
                ids.extend(
                    records
                        .iter()
                        .filter_map(RawRecord::entity_id)
                        .map(ToString::to_string),
                );
            }
        }

        let secs = self.enrichment_timeout_secs;
        let lookups = wanted
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(context, ids)| {
                let joiner = Arc::clone(&self.joiner);
                async move {
                    let ids: Vec<String> = ids.into_iter().collect();
                    let result = match tokio::time::timeout(
                        Duration::from_secs(secs),
                        joiner.lookup(context, &ids, now),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Timeout(secs)),
                    };
                    (context, result)
                }
            });

        let mut maps = ContextMaps::default();
        for (context, result) in join_all(lookups).await {
            match result {
                Ok(batch) => maps.absorb(batch),
                Err(e) => {
                    log::warn!("Enrichment {} failed: {}", context.as_str(), e);
                    errors.push(SourceFailure::new(context.as_str(), &e));
                }
            }
        }
        maps
    }
}

fn build_signal(
    rule: SourceRule,
    raw: &RawRecord,
    contexts: &ContextMaps,
    env: &NormalizeEnv<'_>,
    group_key: Option<&str>,
) -> Option<Signal> {
    let ctx = contexts.context_for(raw.entity_id(), rule.contexts);
    let mut signal = (rule.normalize)(raw, &ctx, env)?;
    if let Some(wanted) = group_key {
        if signal.group_key.as_deref() != Some(wanted) {
            return None;
        }
    }
    let Some(scored) = (rule.score)(&signal.inputs) else {
        log::debug!("No {} score for {}", rule.source, signal.id);
        return None;
    };
    signal.score = scored.score;
    signal.urgency_tier = scored.tier;
    Some(signal)
}
