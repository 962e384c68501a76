//! Enrichment joiners.
//!
//! One batched lookup per context type per request, keyed by the contact ids
//! present in the current collector batches. Multi-row secondaries are
//! reduced to the most recent row per entity. Entities with no rows get the
//! defaults below instead of nulls.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::collectors::with_readonly_db;
use super::normalize::{days_between, parse_instant};
use crate::db::{DbLastCommunication, DbPipelineTotal, DbRelationshipHealth};
use crate::error::SourceError;

/// Days-since-contact reported when no contact timestamp exists.
pub const UNKNOWN_DAYS_SINCE_CONTACT: i64 = 999;

/// Kinds of secondary context a source can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextType {
    LastCommunication,
    RelationshipHealth,
    PipelineTotals,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::LastCommunication => "last_communication",
            ContextType::RelationshipHealth => "relationship_health",
            ContextType::PipelineTotals => "pipeline_totals",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommunication {
    pub subject: Option<String>,
    pub occurred_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBand {
    Hot,
    Warm,
    Cool,
}

impl HealthBand {
    pub fn from_temperature(temperature: i64) -> Self {
        if temperature >= 80 {
            HealthBand::Hot
        } else if temperature >= 50 {
            HealthBand::Warm
        } else {
            HealthBand::Cool
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipHealth {
    /// 0-100.
    pub temperature: i64,
    pub days_since_contact: i64,
    pub band: HealthBand,
}

impl Default for RelationshipHealth {
    fn default() -> Self {
        Self {
            temperature: 0,
            days_since_contact: UNKNOWN_DAYS_SINCE_CONTACT,
            band: HealthBand::Cool,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTotals {
    pub sum_value: f64,
    pub count: i64,
}

/// Result of one joiner call.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextBatch {
    LastCommunication(HashMap<String, LastCommunication>),
    RelationshipHealth(HashMap<String, RelationshipHealth>),
    PipelineTotals(HashMap<String, PipelineTotals>),
}

impl ContextBatch {
    pub fn len(&self) -> usize {
        match self {
            ContextBatch::LastCommunication(m) => m.len(),
            ContextBatch::RelationshipHealth(m) => m.len(),
            ContextBatch::PipelineTotals(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batched secondary lookup for one context type.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn lookup(
        &self,
        context: ContextType,
        entity_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<ContextBatch, SourceError>;
}

/// Joiner backed by the operations store.
#[derive(Debug, Clone)]
pub struct SqliteContextProvider {
    db_path: PathBuf,
}

impl SqliteContextProvider {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[async_trait]
impl ContextProvider for SqliteContextProvider {
    async fn lookup(
        &self,
        context: ContextType,
        entity_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<ContextBatch, SourceError> {
        let ids = entity_ids.to_vec();
        match context {
            ContextType::LastCommunication => {
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.list_communications_for_contacts(&ids)
                })
                .await?;
                Ok(ContextBatch::LastCommunication(latest_per_entity(rows)))
            }
            ContextType::RelationshipHealth => {
                let rows = with_readonly_db(&self.db_path, move |db| {
                    db.list_relationship_health(&ids)
                })
                .await?;
                Ok(ContextBatch::RelationshipHealth(health_by_entity(rows, now)))
            }
            ContextType::PipelineTotals => {
                let rows =
                    with_readonly_db(&self.db_path, move |db| db.list_pipeline_totals(&ids))
                        .await?;
                Ok(ContextBatch::PipelineTotals(pipeline_by_entity(rows)))
            }
        }
    }
}

/// Keep the first row seen per contact. Callers pass rows ordered by
/// contact, newest first, so the first row is the latest one.
pub fn latest_per_entity(rows: Vec<DbLastCommunication>) -> HashMap<String, LastCommunication> {
    let mut latest = HashMap::new();
    for row in rows {
        latest
            .entry(row.contact_id)
            .or_insert_with(|| LastCommunication {
                subject: row.subject,
                occurred_at: row.occurred_at,
            });
    }
    latest
}

pub fn health_by_entity(
    rows: Vec<DbRelationshipHealth>,
    now: DateTime<Utc>,
) -> HashMap<String, RelationshipHealth> {
    rows.into_iter()
        .map(|row| {
            let temperature = row.temperature.clamp(0, 100);
            let days_since_contact = row
                .last_contact_at
                .as_deref()
                .and_then(parse_instant)
                .map(|at| days_between(now, at).max(0))
                .unwrap_or(UNKNOWN_DAYS_SINCE_CONTACT);
            (
                row.contact_id,
                RelationshipHealth {
                    temperature,
                    days_since_contact,
                    band: HealthBand::from_temperature(temperature),
                },
            )
        })
        .collect()
}

pub fn pipeline_by_entity(rows: Vec<DbPipelineTotal>) -> HashMap<String, PipelineTotals> {
    rows.into_iter()
        .map(|row| {
            (
                row.contact_id,
                PipelineTotals {
                    sum_value: row.sum_value,
                    count: row.count,
                },
            )
        })
        .collect()
}

/// All joiner results for one request.
#[derive(Debug, Clone, Default)]
pub struct ContextMaps {
    last_communication: HashMap<String, LastCommunication>,
    relationship_health: HashMap<String, RelationshipHealth>,
    pipeline_totals: HashMap<String, PipelineTotals>,
}

impl ContextMaps {
    pub fn absorb(&mut self, batch: ContextBatch) {
        match batch {
            ContextBatch::LastCommunication(m) => self.last_communication.extend(m),
            ContextBatch::RelationshipHealth(m) => self.relationship_health.extend(m),
            ContextBatch::PipelineTotals(m) => self.pipeline_totals.extend(m),
        }
    }

    /// Context for one record, restricted to the types its source declared.
    /// Requested health and pipeline context always resolve (defaults when
    /// the entity has no rows); a missing last communication stays absent.
    pub fn context_for(&self, entity_id: Option<&str>, types: &[ContextType]) -> EntityContext {
        let mut ctx = EntityContext::default();
        for context in types {
            match context {
                ContextType::LastCommunication => {
                    ctx.last_communication =
                        entity_id.and_then(|id| self.last_communication.get(id).cloned());
                }
                ContextType::RelationshipHealth => {
                    ctx.relationship_health = Some(
                        entity_id
                            .and_then(|id| self.relationship_health.get(id).cloned())
                            .unwrap_or_default(),
                    );
                }
                ContextType::PipelineTotals => {
                    ctx.pipeline_totals = Some(
                        entity_id
                            .and_then(|id| self.pipeline_totals.get(id).cloned())
                            .unwrap_or_default(),
                    );
                }
            }
        }
        ctx
    }
}

/// Context attached to a single record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityContext {
    pub last_communication: Option<LastCommunication>,
    pub relationship_health: Option<RelationshipHealth>,
    pub pipeline_totals: Option<PipelineTotals>,
}

impl EntityContext {
    /// Write whatever context is present into a signal's enrichment bag.
    pub fn write_into(&self, bag: &mut Map<String, Value>) {
        if let Some(last) = &self.last_communication {
            insert_json(bag, "lastCommunication", last);
        }
        if let Some(health) = &self.relationship_health {
            insert_json(bag, "relationshipHealth", health);
        }
        if let Some(totals) = &self.pipeline_totals {
            insert_json(bag, "pipelineTotals", totals);
        }
    }
}

fn insert_json<T: Serialize>(bag: &mut Map<String, Value>, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(v) => {
            bag.insert(key.to_string(), v);
        }
        Err(e) => log::debug!("Skipping {key} enrichment: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::{DbCommunication, DbServiceDeal};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn last(contact: &str, subject: &str, at: &str) -> DbLastCommunication {
        DbLastCommunication {
            contact_id: contact.to_string(),
            subject: Some(subject.to_string()),
            occurred_at: at.to_string(),
        }
    }

    #[test]
    fn latest_per_entity_keeps_first_row_per_contact() {
        let rows = vec![
            last("c1", "newest", "2026-10-10T09:00:00Z"),
            last("c1", "older", "2026-09-01T09:00:00Z"),
            last("c2", "only", "2026-08-01T09:00:00Z"),
        ];
        let latest = latest_per_entity(rows);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["c1"].subject.as_deref(), Some("newest"));
        assert_eq!(latest["c2"].subject.as_deref(), Some("only"));
    }

    #[test]
    fn health_rows_get_days_and_band() {
        let rows = vec![
            DbRelationshipHealth {
                contact_id: "c1".into(),
                temperature: 85,
                last_contact_at: Some("2026-10-06T12:00:00Z".into()),
            },
            DbRelationshipHealth {
                contact_id: "c2".into(),
                temperature: 140,
                last_contact_at: None,
            },
        ];
        let health = health_by_entity(rows, now());
        assert_eq!(health["c1"].days_since_contact, 10);
        assert_eq!(health["c1"].band, HealthBand::Hot);
        assert_eq!(health["c2"].temperature, 100);
        assert_eq!(health["c2"].days_since_contact, UNKNOWN_DAYS_SINCE_CONTACT);
    }

    #[test]
    fn bands_follow_temperature_thresholds() {
        assert_eq!(HealthBand::from_temperature(80), HealthBand::Hot);
        assert_eq!(HealthBand::from_temperature(79), HealthBand::Warm);
        assert_eq!(HealthBand::from_temperature(50), HealthBand::Warm);
        assert_eq!(HealthBand::from_temperature(49), HealthBand::Cool);
    }

    #[test]
    fn missing_entities_resolve_to_documented_defaults() {
        let maps = ContextMaps::default();
        let ctx = maps.context_for(
            Some("ghost"),
            &[
                ContextType::LastCommunication,
                ContextType::RelationshipHealth,
                ContextType::PipelineTotals,
            ],
        );
        assert!(ctx.last_communication.is_none());
        assert_eq!(ctx.relationship_health, Some(RelationshipHealth::default()));
        assert_eq!(ctx.pipeline_totals, Some(PipelineTotals::default()));

        let mut bag = Map::new();
        ctx.write_into(&mut bag);
        assert!(!bag.contains_key("lastCommunication"));
        assert_eq!(bag["relationshipHealth"]["temperature"], 0);
        assert_eq!(bag["relationshipHealth"]["daysSinceContact"], 999);
        assert_eq!(bag["pipelineTotals"]["sumValue"], 0.0);
        assert_eq!(bag["pipelineTotals"]["count"], 0);
    }

    #[test]
    fn undeclared_context_types_are_not_attached() {
        let mut maps = ContextMaps::default();
        maps.absorb(ContextBatch::PipelineTotals(HashMap::from([(
            "c1".to_string(),
            PipelineTotals {
                sum_value: 10.0,
                count: 1,
            },
        )])));
        let ctx = maps.context_for(Some("c1"), &[ContextType::RelationshipHealth]);
        assert!(ctx.pipeline_totals.is_none());
        assert!(ctx.relationship_health.is_some());
    }

    #[tokio::test]
    async fn sqlite_provider_returns_latest_communication() {
        let (db, path) = test_db();
        for (id, at) in [("m1", "2026-09-01T10:00:00Z"), ("m2", "2026-10-01T10:00:00Z")] {
            db.upsert_communication(&DbCommunication {
                id: id.to_string(),
                contact_id: Some("c1".to_string()),
                contact_name: None,
                contact_email: None,
                subject: Some(format!("subject {id}")),
                direction: "outbound".to_string(),
                requires_response: false,
                responded_at: None,
                occurred_at: at.to_string(),
                project_code: None,
            })
            .unwrap();
        }

        let provider = SqliteContextProvider::new(&path);
        let batch = provider
            .lookup(ContextType::LastCommunication, &["c1".to_string()], now())
            .await
            .unwrap();
        match batch {
            ContextBatch::LastCommunication(map) => {
                assert_eq!(map["c1"].subject.as_deref(), Some("subject m2"));
            }
            other => panic!("unexpected batch {other:?}"),
        }
    }

    #[tokio::test]
    async fn sqlite_provider_sums_open_pipeline() {
        let (db, path) = test_db();
        db.upsert_service_deal(&DbServiceDeal {
            id: "s1".into(),
            name: Some("Retainer".into()),
            contact_id: Some("c1".into()),
            value: Some(1_200.0),
            stage: "proposal".into(),
            expected_close: None,
            project_code: None,
            fit_score: None,
        })
        .unwrap();

        let provider = SqliteContextProvider::new(&path);
        let batch = provider
            .lookup(ContextType::PipelineTotals, &["c1".to_string()], now())
            .await
            .unwrap();
        assert_eq!(
            batch,
            ContextBatch::PipelineTotals(HashMap::from([(
                "c1".to_string(),
                PipelineTotals {
                    sum_value: 1_200.0,
                    count: 1
                }
            )]))
        );
    }

    #[tokio::test]
    async fn missing_store_is_reported_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = SqliteContextProvider::new(dir.path().join("absent.db"));
        let err = provider
            .lookup(ContextType::RelationshipHealth, &["c1".to_string()], now())
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), crate::error::FailureKind::Unavailable);
    }
}
