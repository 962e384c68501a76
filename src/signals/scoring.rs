//! Per-source scoring rules.
//!
//! Each inbox class has a base offset that keeps classes apart; additive
//! terms only move a signal within its class. The tier always comes from the
//! same rule as the score.

use super::types::{ScoreInputs, UrgencyTier};

const OVERDUE_BASE: f64 = 100.0;
const OVERDUE_PER_DAY: f64 = 2.0;
const OVERDUE_HIGH_IMPORTANCE_BONUS: f64 = 20.0;

const MESSAGE_BASE: f64 = 80.0;
const MESSAGE_PER_DAY: f64 = 10.0;

const DEADLINE_BASE: f64 = 60.0;
const DEADLINE_PER_DAY: f64 = 5.0;
const DEADLINE_HIGH_IMPORTANCE_BONUS: f64 = 15.0;

const STALE_BASE: f64 = 30.0;
const STALE_PER_DAY: f64 = 0.5;
const STALE_DAYS_CAP: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub score: f64,
    pub tier: UrgencyTier,
}

/// Returns `None` when handed inputs from a different source type.
pub type ScoreFn = fn(&ScoreInputs) -> Option<Scored>;

pub fn score_overdue_action(days_overdue: i64, high_importance: bool) -> Scored {
    let bonus = if high_importance {
        OVERDUE_HIGH_IMPORTANCE_BONUS
    } else {
        0.0
    };
    let tier = if days_overdue > 14 {
        UrgencyTier::Critical
    } else if days_overdue > 3 || high_importance {
        UrgencyTier::High
    } else {
        UrgencyTier::Medium
    };
    Scored {
        score: OVERDUE_BASE + OVERDUE_PER_DAY * days_overdue as f64 + bonus,
        tier,
    }
}

pub fn score_unanswered_message(days_old: i64) -> Scored {
    Scored {
        score: MESSAGE_BASE + MESSAGE_PER_DAY * days_old as f64,
        tier: if days_old > 2 {
            UrgencyTier::High
        } else {
            UrgencyTier::Medium
        },
    }
}

pub fn score_upcoming_deadline(days_left: i64, high_importance: bool) -> Scored {
    let bonus = if high_importance {
        DEADLINE_HIGH_IMPORTANCE_BONUS
    } else {
        0.0
    };
    let tier = if days_left <= 1 {
        UrgencyTier::High
    } else if days_left <= 3 {
        UrgencyTier::Medium
    } else {
        UrgencyTier::Low
    };
    Scored {
        score: DEADLINE_BASE + DEADLINE_PER_DAY * (7 - days_left) as f64 + bonus,
        tier,
    }
}

pub fn score_stale_relationship(days_since_contact: i64) -> Scored {
    Scored {
        score: STALE_BASE + STALE_PER_DAY * days_since_contact.min(STALE_DAYS_CAP) as f64,
        tier: if days_since_contact > 60 {
            UrgencyTier::Medium
        } else {
            UrgencyTier::Low
        },
    }
}

/// Opportunities rank by fit, not urgency; the tier only reflects how close
/// the deadline is.
pub fn score_opportunity(fit_score: Option<f64>, days_to_deadline: Option<i64>) -> Scored {
    let tier = match days_to_deadline {
        Some(d) if d <= 7 => UrgencyTier::High,
        Some(d) if d <= 30 => UrgencyTier::Medium,
        _ => UrgencyTier::Low,
    };
    Scored {
        score: fit_score.unwrap_or(0.0),
        tier,
    }
}

// Rule-table entries.

pub fn overdue_action_rule(inputs: &ScoreInputs) -> Option<Scored> {
    match *inputs {
        ScoreInputs::OverdueAction {
            days_overdue,
            high_importance,
        } => Some(score_overdue_action(days_overdue, high_importance)),
        _ => None,
    }
}

pub fn unanswered_message_rule(inputs: &ScoreInputs) -> Option<Scored> {
    match *inputs {
        ScoreInputs::UnansweredMessage { days_old } => Some(score_unanswered_message(days_old)),
        _ => None,
    }
}

pub fn upcoming_deadline_rule(inputs: &ScoreInputs) -> Option<Scored> {
    match *inputs {
        ScoreInputs::UpcomingDeadline {
            days_left,
            high_importance,
        } => Some(score_upcoming_deadline(days_left, high_importance)),
        _ => None,
    }
}

pub fn stale_relationship_rule(inputs: &ScoreInputs) -> Option<Scored> {
    match *inputs {
        ScoreInputs::StaleRelationship { days_since_contact } => {
            Some(score_stale_relationship(days_since_contact))
        }
        _ => None,
    }
}

pub fn opportunity_rule(inputs: &ScoreInputs) -> Option<Scored> {
    match *inputs {
        ScoreInputs::Opportunity {
            fit_score,
            days_to_deadline,
        } => Some(score_opportunity(fit_score, days_to_deadline)),
        _ => None,
    }
}
