//! Shared type definitions for the database layer.
//!
//! Row structs mirror the narrow read contracts the collectors and joiners
//! rely on. Text columns that a record needs to be displayable stay
//! `Option` here; the normalizer decides whether a row is usable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `actions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAction {
    pub id: String,
    pub title: Option<String>,
    pub project_code: Option<String>,
    pub status: String,
    pub action_required: bool,
    /// `YYYY-MM-DD`.
    pub follow_up_date: Option<String>,
    pub importance: Option<String>,
    pub contact_id: Option<String>,
}

/// A row from the `communications` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCommunication {
    pub id: String,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub subject: Option<String>,
    pub direction: String,
    pub requires_response: bool,
    pub responded_at: Option<String>,
    /// RFC 3339.
    pub occurred_at: String,
    pub project_code: Option<String>,
}

/// A row from the `contacts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbContact {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    /// `YYYY-MM-DD`.
    pub last_contact_date: Option<String>,
    pub engagement_status: String,
}

/// A row from `relationship_health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRelationshipHealth {
    pub contact_id: String,
    pub temperature: i64,
    pub last_contact_at: Option<String>,
}

/// A row from the `milestones` table (project deadlines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMilestone {
    pub id: String,
    pub title: Option<String>,
    pub project_code: Option<String>,
    /// `YYYY-MM-DD`.
    pub due_date: Option<String>,
    pub importance: Option<String>,
    pub status: String,
}

/// A row from `grant_opportunities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbGrant {
    pub id: String,
    pub name: Option<String>,
    pub funder: Option<String>,
    pub description: Option<String>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub deadline: Option<String>,
    pub status: String,
    pub fit_score: Option<f64>,
    pub project_code: Option<String>,
    pub contact_id: Option<String>,
}

/// A row from `service_deals` (sales pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbServiceDeal {
    pub id: String,
    pub name: Option<String>,
    pub contact_id: Option<String>,
    pub value: Option<f64>,
    pub stage: String,
    pub expected_close: Option<String>,
    pub project_code: Option<String>,
    pub fit_score: Option<f64>,
}

/// A row from `fundraising_pipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFundraisingProspect {
    pub id: String,
    pub donor_name: Option<String>,
    pub contact_id: Option<String>,
    pub ask_amount: Option<f64>,
    pub stage: String,
    pub next_step_date: Option<String>,
    pub project_code: Option<String>,
    pub fit_score: Option<f64>,
}

/// Most recent communication for a contact, produced by the batched join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLastCommunication {
    pub contact_id: String,
    pub subject: Option<String>,
    pub occurred_at: String,
}

/// Open pipeline value aggregated per contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPipelineTotal {
    pub contact_id: String,
    pub sum_value: f64,
    pub count: i64,
}

/// Build `?1, ?2, …` placeholders for an `IN (…)` clause.
pub(crate) fn in_placeholders(len: usize, offset: usize) -> String {
    (1..=len)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}
