//! Multi-source signal aggregation and ranking.
//!
//! Collectors read bounded batches per source, joiners attach secondary
//! context in one batched lookup per context type, the normalizer turns rows
//! into `Signal`s, per-source rules score them, and the ranker merges
//! everything into one ordered, bounded feed.

pub mod collectors;
pub mod engine;
pub mod enrichment;
pub mod normalize;
pub mod ranking;
pub mod scoring;
pub mod types;

pub use collectors::{CollectWindow, SignalCollector, SqliteCollector};
pub use engine::{builtin_rule, FeedRequest, SignalEngine, SourceRule};
pub use enrichment::{ContextProvider, ContextType, SqliteContextProvider};
pub use ranking::{Feed, FeedCounts};
pub use types::{FeedKind, OpportunityFacts, RawRecord, Signal, SourceType, UrgencyTier};
