//! Merge, dedupe, order, count and truncate.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::types::{FeedKind, Signal, SourceType};
use crate::error::SourceFailure;

/// Per-source counts over the full, pre-truncation set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedCounts {
    pub by_source: BTreeMap<SourceType, usize>,
    pub total: usize,
}

impl FeedCounts {
    /// Zero counts for every source in `sources`.
    pub fn zeroed(sources: &[SourceType]) -> Self {
        Self {
            by_source: sources.iter().map(|s| (*s, 0)).collect(),
            total: 0,
        }
    }

    pub fn get(&self, source: SourceType) -> usize {
        self.by_source.get(&source).copied().unwrap_or(0)
    }
}

impl Serialize for FeedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_source.len() + 1))?;
        for (source, count) in &self.by_source {
            map.serialize_entry(source.as_str(), count)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

/// Response envelope for both feeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Feed {
    pub items: Vec<Signal>,
    pub counts: FeedCounts,
    pub errors: Vec<SourceFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Feed {
    /// Well-formed empty envelope for a request that failed as a whole.
    pub fn failed(sources: &[SourceType], message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            counts: FeedCounts::zeroed(sources),
            errors: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Collapse duplicate ids, keeping the highest-scoring copy at the position
/// where the id first appeared.
pub fn dedupe(signals: Vec<Signal>) -> Vec<Signal> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(signals.len());
    let mut unique: Vec<Signal> = Vec::with_capacity(signals.len());
    for signal in signals {
        match positions.get(&signal.id) {
            Some(&idx) => {
                if signal.score > unique[idx].score {
                    unique[idx] = signal;
                }
            }
            None => {
                positions.insert(signal.id.clone(), unique.len());
                unique.push(signal);
            }
        }
    }
    unique
}

/// Urgency order: score descending, then source declaration order. The
/// sort is stable, so insertion order breaks any remaining tie.
pub fn compare_urgency(a: &Signal, b: &Signal) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.source_type.cmp(&b.source_type))
}

/// Opportunity order: fit score (present first, descending), then deadline
/// (present first, soonest first). Insertion order breaks remaining ties.
pub fn compare_opportunity(a: &Signal, b: &Signal) -> Ordering {
    let fit = |s: &Signal| s.opportunity.as_ref().and_then(|o| o.fit_score);
    let deadline = |s: &Signal| s.opportunity.as_ref().and_then(|o| o.deadline.clone());

    let by_fit = match (fit(a), fit(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_fit.then_with(|| match (deadline(a), deadline(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Concatenate batches (in registration order), dedupe, sort, count, then
/// truncate to `limit`.
pub fn merge(
    batches: Vec<Vec<Signal>>,
    feed: FeedKind,
    sources: &[SourceType],
    limit: usize,
) -> (Vec<Signal>, FeedCounts) {
    let mut signals = dedupe(batches.into_iter().flatten().collect());

    match feed {
        FeedKind::Urgency => signals.sort_by(compare_urgency),
        FeedKind::Opportunity => signals.sort_by(compare_opportunity),
    }

    let mut counts = FeedCounts::zeroed(sources);
    for signal in &signals {
        *counts.by_source.entry(signal.source_type).or_insert(0) += 1;
    }
    counts.total = signals.len();

    signals.truncate(limit);
    (signals, counts)
}
