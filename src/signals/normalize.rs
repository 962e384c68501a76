//! Raw record → `Signal`.
//!
//! Pure: the only clock is the `now` in [`NormalizeEnv`]. A record that
//! cannot be made displayable (no title, unparseable reference date) or
//! that falls outside its source's sanity bounds yields `None` and is
//! dropped without affecting its siblings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use super::enrichment::EntityContext;
use super::types::{OpportunityFacts, RawRecord, ScoreInputs, Signal, SourceType, UrgencyTier};
use crate::db::{DbAction, DbCommunication, DbContact, DbGrant, DbMilestone};

/// Stale relationships older than this are treated as data-quality artifacts.
pub const MAX_STALE_DAYS: i64 = 180;
/// Upcoming deadlines are only surfaced this many days ahead.
pub const DEADLINE_LOOKAHEAD_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

/// Inputs shared by every normalize call within one request.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeEnv<'a> {
    pub now: DateTime<Utc>,
    pub project_keywords: &'a BTreeMap<String, Vec<String>>,
}

pub type NormalizeFn = fn(&RawRecord, &EntityContext, &NormalizeEnv<'_>) -> Option<Signal>;

/// Whole days from `reference` to `now`, floored. Negative when
/// `reference` is in the future.
pub fn days_between(now: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    (now - reference).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC).
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn is_high(importance: Option<&str>) -> bool {
    importance
        .map(|i| i.trim().eq_ignore_ascii_case("high"))
        .unwrap_or(false)
}

fn new_signal(
    source: SourceType,
    row_id: &str,
    title: String,
    group_key: Option<&str>,
    age_days: Option<i64>,
    inputs: ScoreInputs,
) -> Signal {
    Signal {
        id: source.signal_id(row_id),
        source_type: source,
        title,
        subtitle: None,
        group_key: non_empty(group_key),
        urgency_tier: UrgencyTier::Low,
        score: 0.0,
        age_days,
        enrichment: Map::new(),
        opportunity: None,
        inputs,
    }
}

fn put(bag: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = non_empty(value) {
        bag.insert(key.to_string(), Value::String(v));
    }
}

fn log_drop(source: SourceType, row_id: &str, reason: &str) {
    log::debug!("Dropping {source} record {row_id}: {reason}");
}

// =============================================================================
// Inbox sources
// =============================================================================

pub fn normalize_overdue_action(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Action(action) = raw else {
        return None;
    };
    let source = SourceType::OverdueAction;
    let Some(title) = non_empty(action.title.as_deref()) else {
        log_drop(source, &action.id, "missing title");
        return None;
    };
    let Some(follow_up) = action.follow_up_date.as_deref().and_then(parse_instant) else {
        log_drop(source, &action.id, "unparseable follow-up date");
        return None;
    };
    let days_overdue = days_between(env.now, follow_up);
    if days_overdue < 1 {
        return None;
    }

    let mut signal = new_signal(
        source,
        &action.id,
        title,
        action.project_code.as_deref(),
        Some(days_overdue),
        ScoreInputs::OverdueAction {
            days_overdue,
            high_importance: is_high(action.importance.as_deref()),
        },
    );
    signal.subtitle = Some(format!("{days_overdue}d overdue"));
    action_enrichment(action, &mut signal.enrichment);
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

fn action_enrichment(action: &DbAction, bag: &mut Map<String, Value>) {
    put(bag, "contactId", action.contact_id.as_deref());
    put(bag, "importance", action.importance.as_deref());
    put(bag, "followUpDate", action.follow_up_date.as_deref());
}

pub fn normalize_unanswered_message(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Message(message) = raw else {
        return None;
    };
    let source = SourceType::UnansweredMessage;
    let sender = non_empty(message.contact_name.as_deref())
        .or_else(|| non_empty(message.contact_email.as_deref()));
    let title = match (non_empty(message.subject.as_deref()), sender.as_deref()) {
        (Some(subject), _) => subject,
        (None, Some(sender)) => format!("Message from {sender}"),
        (None, None) => {
            log_drop(source, &message.id, "no subject or sender");
            return None;
        }
    };
    let Some(received) = parse_instant(&message.occurred_at) else {
        log_drop(source, &message.id, "unparseable timestamp");
        return None;
    };
    let days_old = days_between(env.now, received);
    if days_old < 0 {
        log_drop(source, &message.id, "timestamp in the future");
        return None;
    }

    let mut signal = new_signal(
        source,
        &message.id,
        title,
        message.project_code.as_deref(),
        Some(days_old),
        ScoreInputs::UnansweredMessage { days_old },
    );
    signal.subtitle = Some(match (sender, days_old) {
        (Some(sender), 0) => format!("{sender}, waiting since today"),
        (Some(sender), d) => format!("{sender}, waiting {d}d"),
        (None, 0) => "waiting since today".to_string(),
        (None, d) => format!("waiting {d}d"),
    });
    message_enrichment(message, &mut signal.enrichment);
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

fn message_enrichment(message: &DbCommunication, bag: &mut Map<String, Value>) {
    put(bag, "contactId", message.contact_id.as_deref());
    put(bag, "contactName", message.contact_name.as_deref());
    put(bag, "contactEmail", message.contact_email.as_deref());
    put(bag, "receivedAt", Some(message.occurred_at.as_str()));
}

pub fn normalize_upcoming_deadline(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Deadline(milestone) = raw else {
        return None;
    };
    let source = SourceType::UpcomingDeadline;
    let Some(title) = non_empty(milestone.title.as_deref()) else {
        log_drop(source, &milestone.id, "missing title");
        return None;
    };
    let Some(due) = milestone.due_date.as_deref().and_then(parse_instant) else {
        log_drop(source, &milestone.id, "unparseable due date");
        return None;
    };
    let age = days_between(env.now, due);
    let days_left = -age;
    if !(0..=DEADLINE_LOOKAHEAD_DAYS).contains(&days_left) {
        return None;
    }

    let mut signal = new_signal(
        source,
        &milestone.id,
        title,
        milestone.project_code.as_deref(),
        Some(age),
        ScoreInputs::UpcomingDeadline {
            days_left,
            high_importance: is_high(milestone.importance.as_deref()),
        },
    );
    signal.subtitle = Some(match days_left {
        0 => "due today".to_string(),
        1 => "due tomorrow".to_string(),
        d => format!("due in {d}d"),
    });
    milestone_enrichment(milestone, &mut signal.enrichment);
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

fn milestone_enrichment(milestone: &DbMilestone, bag: &mut Map<String, Value>) {
    put(bag, "dueDate", milestone.due_date.as_deref());
    put(bag, "importance", milestone.importance.as_deref());
}

pub fn normalize_stale_relationship(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Contact(contact) = raw else {
        return None;
    };
    let source = SourceType::StaleRelationship;
    let Some(title) = non_empty(contact.full_name.as_deref())
        .or_else(|| non_empty(contact.email.as_deref()))
    else {
        log_drop(source, &contact.id, "no name or email");
        return None;
    };
    let Some(last_contact) = contact.last_contact_date.as_deref().and_then(parse_instant) else {
        log_drop(source, &contact.id, "unparseable last contact date");
        return None;
    };
    let days_since_contact = days_between(env.now, last_contact);
    if days_since_contact < 0 {
        log_drop(source, &contact.id, "last contact in the future");
        return None;
    }
    if days_since_contact > MAX_STALE_DAYS {
        log_drop(source, &contact.id, "beyond stale sanity bound");
        return None;
    }

    let mut signal = new_signal(
        source,
        &contact.id,
        title,
        None,
        Some(days_since_contact),
        ScoreInputs::StaleRelationship { days_since_contact },
    );
    signal.subtitle = Some(match contact.company_name.as_deref().map(str::trim) {
        Some(company) if !company.is_empty() => {
            format!("{company}, {days_since_contact}d since contact")
        }
        _ => format!("{days_since_contact}d since contact"),
    });
    contact_enrichment(contact, &mut signal.enrichment);
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

fn contact_enrichment(contact: &DbContact, bag: &mut Map<String, Value>) {
    put(bag, "email", contact.email.as_deref());
    put(bag, "companyName", contact.company_name.as_deref());
    put(bag, "engagementStatus", Some(contact.engagement_status.as_str()));
}

// =============================================================================
// Opportunity sources
// =============================================================================

/// Deadline shared by every opportunity source. `Err` means the field was
/// present but unparseable.
fn opportunity_deadline(
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<(String, i64)>, ()> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let at = parse_instant(raw).ok_or(())?;
    let label = at.date_naive().format("%Y-%m-%d").to_string();
    Ok(Some((label, -days_between(now, at))))
}

struct OpportunityParts<'a> {
    source: SourceType,
    row_id: &'a str,
    title: Option<&'a str>,
    project_code: Option<&'a str>,
    deadline: Option<&'a str>,
    amount_min: Option<f64>,
    amount_max: Option<f64>,
    status: &'a str,
    fit_score: Option<f64>,
}

fn build_opportunity(parts: OpportunityParts<'_>, now: DateTime<Utc>) -> Option<Signal> {
    let Some(title) = non_empty(parts.title) else {
        log_drop(parts.source, parts.row_id, "missing name");
        return None;
    };
    let Ok(deadline) = opportunity_deadline(parts.deadline, now) else {
        log_drop(parts.source, parts.row_id, "unparseable deadline");
        return None;
    };
    let days_to_deadline = deadline.as_ref().map(|(_, d)| *d);

    let mut signal = new_signal(
        parts.source,
        parts.row_id,
        title,
        parts.project_code,
        days_to_deadline.map(|d| -d),
        ScoreInputs::Opportunity {
            fit_score: parts.fit_score,
            days_to_deadline,
        },
    );
    signal.opportunity = Some(OpportunityFacts {
        amount_min: parts.amount_min,
        amount_max: parts.amount_max,
        deadline: deadline.map(|(label, _)| label),
        status: parts.status.to_string(),
        fit_score: parts.fit_score,
    });
    Some(signal)
}

/// Relevance of a grant to its project: configured keywords found in the
/// grant's name or description, case-insensitive.
pub fn keyword_fit(grant: &DbGrant, project_keywords: &BTreeMap<String, Vec<String>>) -> Option<f64> {
    let project = grant.project_code.as_deref()?;
    let keywords = project_keywords.get(project)?;
    if keywords.is_empty() {
        return None;
    }
    let haystack = format!(
        "{} {}",
        grant.name.as_deref().unwrap_or_default(),
        grant.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let hits = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && haystack.contains(k.as_str()))
        .count();
    Some(hits as f64)
}

pub fn normalize_grant(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Grant(grant) = raw else {
        return None;
    };
    let fit_score = grant
        .fit_score
        .or_else(|| keyword_fit(grant, env.project_keywords));
    let mut signal = build_opportunity(
        OpportunityParts {
            source: SourceType::GrantOpportunity,
            row_id: &grant.id,
            title: grant.name.as_deref(),
            project_code: grant.project_code.as_deref(),
            deadline: grant.deadline.as_deref(),
            amount_min: grant.amount_min,
            amount_max: grant.amount_max,
            status: &grant.status,
            fit_score,
        },
        env.now,
    )?;
    signal.subtitle = non_empty(grant.funder.as_deref());
    put(&mut signal.enrichment, "funder", grant.funder.as_deref());
    put(&mut signal.enrichment, "contactId", grant.contact_id.as_deref());
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

pub fn normalize_service(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Service(deal) = raw else {
        return None;
    };
    let mut signal = build_opportunity(
        OpportunityParts {
            source: SourceType::ServiceOpportunity,
            row_id: &deal.id,
            title: deal.name.as_deref(),
            project_code: deal.project_code.as_deref(),
            deadline: deal.expected_close.as_deref(),
            amount_min: deal.value,
            amount_max: deal.value,
            status: &deal.stage,
            fit_score: deal.fit_score,
        },
        env.now,
    )?;
    signal.subtitle = Some(format!("stage: {}", deal.stage));
    put(&mut signal.enrichment, "contactId", deal.contact_id.as_deref());
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}

pub fn normalize_fundraising(
    raw: &RawRecord,
    ctx: &EntityContext,
    env: &NormalizeEnv<'_>,
) -> Option<Signal> {
    let RawRecord::Fundraising(prospect) = raw else {
        return None;
    };
    let mut signal = build_opportunity(
        OpportunityParts {
            source: SourceType::FundraisingOpportunity,
            row_id: &prospect.id,
            title: prospect.donor_name.as_deref(),
            project_code: prospect.project_code.as_deref(),
            deadline: prospect.next_step_date.as_deref(),
            amount_min: prospect.ask_amount,
            amount_max: prospect.ask_amount,
            status: &prospect.stage,
            fit_score: prospect.fit_score,
        },
        env.now,
    )?;
    signal.subtitle = Some(format!("stage: {}", prospect.stage));
    put(&mut signal.enrichment, "contactId", prospect.contact_id.as_deref());
    ctx.write_into(&mut signal.enrichment);
    Some(signal)
}
