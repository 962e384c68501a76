//! Configuration types.
//!
//! Loaded from JSON with camelCase keys. Every field has a default so an
//! empty object (or a missing file) yields a usable configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signals::normalize::DEADLINE_LOOKAHEAD_DAYS;
use crate::signals::SourceType;

/// Longest look-back or look-ahead any source accepts.
pub const MAX_WINDOW_DAYS: i64 = 3_650;
/// Longest per-source or enrichment timeout accepted.
pub const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// SQLite file. `~/` is expanded; defaults to `~/.opsdesk/opsdesk.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Project code → keywords used to derive a fit score for grants that
    /// arrive without one.
    #[serde(default)]
    pub project_keywords: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7411".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    #[serde(default = "default_feed_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_feed_limit")]
    pub max_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: default_feed_limit(),
            max_limit: default_max_feed_limit(),
        }
    }
}

fn default_feed_limit() -> usize {
    25
}
fn default_max_feed_limit() -> usize {
    100
}

impl FeedConfig {
    /// Clamp a caller-requested size into `[1, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentConfig {
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_enrichment_timeout(),
        }
    }
}

fn default_enrichment_timeout() -> u64 {
    3
}

/// Per-source overrides. Unset fields fall back to the source's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<i64>,
}

/// Effective collector settings for one source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    /// Hard cap on rows the collector returns.
    pub limit: usize,
    pub timeout_secs: u64,
    /// Look-back or look-ahead window; meaning depends on the source.
    pub window_days: i64,
}

impl SourceSettings {
    /// Built-in defaults per source type.
    pub fn defaults_for(source: SourceType) -> Self {
        let (limit, timeout_secs, window_days) = match source {
            SourceType::OverdueAction => (20, 3, 0),
            SourceType::UnansweredMessage => (15, 3, 14),
            SourceType::UpcomingDeadline => (15, 3, 7),
            SourceType::StaleRelationship => (10, 3, 30),
            SourceType::GrantOpportunity => (20, 5, 180),
            SourceType::ServiceOpportunity => (20, 5, 0),
            SourceType::FundraisingOpportunity => (20, 5, 0),
        };
        Self {
            limit,
            timeout_secs,
            window_days,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesConfig {
    #[serde(default)]
    pub overdue_action: SourceOverrides,
    #[serde(default)]
    pub unanswered_message: SourceOverrides,
    #[serde(default)]
    pub upcoming_deadline: SourceOverrides,
    #[serde(default)]
    pub stale_relationship: SourceOverrides,
    #[serde(default)]
    pub grant_opportunity: SourceOverrides,
    #[serde(default)]
    pub service_opportunity: SourceOverrides,
    #[serde(default)]
    pub fundraising_opportunity: SourceOverrides,
}

impl SourcesConfig {
    fn overrides(&self, source: SourceType) -> &SourceOverrides {
        match source {
            SourceType::OverdueAction => &self.overdue_action,
            SourceType::UnansweredMessage => &self.unanswered_message,
            SourceType::UpcomingDeadline => &self.upcoming_deadline,
            SourceType::StaleRelationship => &self.stale_relationship,
            SourceType::GrantOpportunity => &self.grant_opportunity,
            SourceType::ServiceOpportunity => &self.service_opportunity,
            SourceType::FundraisingOpportunity => &self.fundraising_opportunity,
        }
    }

    /// Effective settings for `source`: overrides layered on defaults.
    pub fn settings(&self, source: SourceType) -> SourceSettings {
        let defaults = SourceSettings::defaults_for(source);
        let o = self.overrides(source);
        SourceSettings {
            limit: o.limit.unwrap_or(defaults.limit),
            timeout_secs: o.timeout_secs.unwrap_or(defaults.timeout_secs),
            window_days: o.window_days.unwrap_or(defaults.window_days),
        }
    }
}

impl Config {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.feed.default_limit == 0 {
            return Err("feed.defaultLimit must be >= 1".to_string());
        }
        if self.feed.max_limit < self.feed.default_limit {
            return Err("feed.maxLimit must be >= feed.defaultLimit".to_string());
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.enrichment.timeout_secs) {
            return Err(format!(
                "enrichment.timeoutSecs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        for source in SourceType::ALL {
            let key = source.config_key();
            let settings = self.sources.settings(source);
            if !(1..=MAX_TIMEOUT_SECS).contains(&settings.timeout_secs) {
                return Err(format!(
                    "sources.{key}.timeoutSecs must be between 1 and {MAX_TIMEOUT_SECS}"
                ));
            }
            if settings.limit == 0 {
                return Err(format!("sources.{key}.limit must be >= 1"));
            }
            let max_window = match source {
                SourceType::UpcomingDeadline => DEADLINE_LOOKAHEAD_DAYS,
                _ => MAX_WINDOW_DAYS,
            };
            if !(0..=max_window).contains(&settings.window_days) {
                return Err(format!(
                    "sources.{key}.windowDays must be between 0 and {max_window}"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.feed.default_limit, 25);
        assert_eq!(config.feed.max_limit, 100);
        assert_eq!(config.server.bind, "127.0.0.1:7411");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.sources.settings(SourceType::UnansweredMessage),
            SourceSettings {
                limit: 15,
                timeout_secs: 3,
                window_days: 14
            }
        );
    }

    #[test]
    fn partial_source_override_keeps_other_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "sources": { "staleRelationship": { "windowDays": 45 } } }"#,
        )
        .expect("parse");
        let stale = config.sources.settings(SourceType::StaleRelationship);
        assert_eq!(stale.window_days, 45);
        assert_eq!(stale.limit, 10);
        assert_eq!(stale.timeout_secs, 3);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{ "sources": { "grantOpportunity": { "timeoutSecs": 0 } } }"#,
        )
        .expect("parse");
        let err = config.validate().expect_err("should reject");
        assert!(err.contains("grantOpportunity"), "{err}");
    }

    #[test]
    fn deadline_window_cannot_exceed_lookahead() {
        let config: Config = serde_json::from_str(
            r#"{ "sources": { "upcomingDeadline": { "windowDays": 14 } } }"#,
        )
        .expect("parse");
        let err = config.validate().expect_err("should reject");
        assert!(err.contains("upcomingDeadline.windowDays"), "{err}");

        let narrower: Config = serde_json::from_str(
            r#"{ "sources": { "upcomingDeadline": { "windowDays": 3 } } }"#,
        )
        .expect("parse");
        assert!(narrower.validate().is_ok());
    }

    #[test]
    fn oversized_windows_and_timeouts_are_rejected() {
        for json in [
            r#"{ "sources": { "grantOpportunity": { "windowDays": 9223372036854775807 } } }"#,
            r#"{ "sources": { "staleRelationship": { "timeoutSecs": 18446744073709551615 } } }"#,
            r#"{ "enrichment": { "timeoutSecs": 18446744073709551615 } }"#,
        ] {
            let config: Config = serde_json::from_str(json).expect("parse");
            assert!(config.validate().is_err(), "{json}");
        }

        let at_bounds: Config = serde_json::from_str(
            r#"{ "sources": { "grantOpportunity": { "windowDays": 3650, "timeoutSecs": 300 } } }"#,
        )
        .expect("parse");
        assert!(at_bounds.validate().is_ok());
    }

    #[test]
    fn max_limit_below_default_is_rejected() {
        let config: Config =
            serde_json::from_str(r#"{ "feed": { "defaultLimit": 50, "maxLimit": 10 } }"#)
                .expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_limit_bounds_requests() {
        let feed = FeedConfig::default();
        assert_eq!(feed.clamp_limit(None), 25);
        assert_eq!(feed.clamp_limit(Some(0)), 1);
        assert_eq!(feed.clamp_limit(Some(10)), 10);
        assert_eq!(feed.clamp_limit(Some(5_000)), 100);
    }
}
