//! Core signal types shared by collectors, normalizer, scorer and ranker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::{
    DbAction, DbCommunication, DbContact, DbFundraisingProspect, DbGrant, DbMilestone,
    DbServiceDeal,
};

/// Closed set of signal sources.
///
/// Declaration order doubles as the tie-break between equal urgency scores,
/// so keep the inbox sources in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    OverdueAction,
    UnansweredMessage,
    UpcomingDeadline,
    StaleRelationship,
    GrantOpportunity,
    ServiceOpportunity,
    FundraisingOpportunity,
}

impl SourceType {
    pub const ALL: [SourceType; 7] = [
        SourceType::OverdueAction,
        SourceType::UnansweredMessage,
        SourceType::UpcomingDeadline,
        SourceType::StaleRelationship,
        SourceType::GrantOpportunity,
        SourceType::ServiceOpportunity,
        SourceType::FundraisingOpportunity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::OverdueAction => "overdue_action",
            SourceType::UnansweredMessage => "unanswered_message",
            SourceType::UpcomingDeadline => "upcoming_deadline",
            SourceType::StaleRelationship => "stale_relationship",
            SourceType::GrantOpportunity => "grant_opportunity",
            SourceType::ServiceOpportunity => "service_opportunity",
            SourceType::FundraisingOpportunity => "fundraising_opportunity",
        }
    }

    /// Key under `sources` in the JSON config.
    pub fn config_key(&self) -> &'static str {
        match self {
            SourceType::OverdueAction => "overdueAction",
            SourceType::UnansweredMessage => "unansweredMessage",
            SourceType::UpcomingDeadline => "upcomingDeadline",
            SourceType::StaleRelationship => "staleRelationship",
            SourceType::GrantOpportunity => "grantOpportunity",
            SourceType::ServiceOpportunity => "serviceOpportunity",
            SourceType::FundraisingOpportunity => "fundraisingOpportunity",
        }
    }

    /// Prefix that namespaces row ids so different tables never collide.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SourceType::OverdueAction => "action",
            SourceType::UnansweredMessage => "message",
            SourceType::UpcomingDeadline => "deadline",
            SourceType::StaleRelationship => "contact",
            SourceType::GrantOpportunity => "grant",
            SourceType::ServiceOpportunity => "service",
            SourceType::FundraisingOpportunity => "fundraising",
        }
    }

    pub fn signal_id(&self, row_id: &str) -> String {
        format!("{}-{}", self.id_prefix(), row_id)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which ordering a feed uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Priority inbox: score descending.
    Urgency,
    /// Opportunities: fit score, then nearest deadline.
    Opportunity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    Low,
    Medium,
    High,
    Critical,
}

/// Value-bearing projection carried by opportunity signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityFacts {
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    /// `YYYY-MM-DD`.
    pub deadline: Option<String>,
    pub status: String,
    pub fit_score: Option<f64>,
}

/// Typed scorer inputs, set by the normalizer. Never serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreInputs {
    OverdueAction {
        days_overdue: i64,
        high_importance: bool,
    },
    UnansweredMessage {
        days_old: i64,
    },
    UpcomingDeadline {
        days_left: i64,
        high_importance: bool,
    },
    StaleRelationship {
        days_since_contact: i64,
    },
    Opportunity {
        fit_score: Option<f64>,
        days_to_deadline: Option<i64>,
    },
}

/// Uniform record every source is normalized into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    pub source_type: SourceType,
    pub title: String,
    pub subtitle: Option<String>,
    pub group_key: Option<String>,
    pub urgency_tier: UrgencyTier,
    pub score: f64,
    /// Positive for past or overdue references, negative for future ones.
    pub age_days: Option<i64>,
    pub enrichment: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity: Option<OpportunityFacts>,
    #[serde(skip)]
    pub inputs: ScoreInputs,
}

/// One row as returned by a collector, tagged by the table it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Action(DbAction),
    Message(DbCommunication),
    Deadline(DbMilestone),
    Contact(DbContact),
    Grant(DbGrant),
    Service(DbServiceDeal),
    Fundraising(DbFundraisingProspect),
}

impl RawRecord {
    /// Contact the record relates to; the key every enrichment join uses.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            RawRecord::Action(a) => a.contact_id.as_deref(),
            RawRecord::Message(m) => m.contact_id.as_deref(),
            RawRecord::Deadline(_) => None,
            RawRecord::Contact(c) => Some(c.id.as_str()),
            RawRecord::Grant(g) => g.contact_id.as_deref(),
            RawRecord::Service(s) => s.contact_id.as_deref(),
            RawRecord::Fundraising(f) => f.contact_id.as_deref(),
        }
    }

    pub fn row_id(&self) -> &str {
        match self {
            RawRecord::Action(a) => &a.id,
            RawRecord::Message(m) => &m.id,
            RawRecord::Deadline(d) => &d.id,
            RawRecord::Contact(c) => &c.id,
            RawRecord::Grant(g) => &g.id,
            RawRecord::Service(s) => &s.id,
            RawRecord::Fundraising(f) => &f.id,
        }
    }
}
