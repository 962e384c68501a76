use rusqlite::params;

use super::*;

/// Grant statuses that take a grant out of the opportunity feed.
const CLOSED_GRANT_STATUSES: &str = "'awarded', 'declined', 'withdrawn'";
/// Deal stages that are no longer open pipeline.
const CLOSED_DEAL_STAGES: &str = "'won', 'lost'";
/// Fundraising stages that are no longer open pipeline.
const CLOSED_FUNDRAISING_STAGES: &str = "'received', 'declined'";

impl OpsDb {
    // =========================================================================
    // Grants
    // =========================================================================

    pub fn upsert_grant(&self, grant: &DbGrant) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO grant_opportunities (id, name, funder, description, amount_min,
                                              amount_max, deadline, status, fit_score,
                                              project_code, contact_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                funder = excluded.funder,
                description = excluded.description,
                amount_min = excluded.amount_min,
                amount_max = excluded.amount_max,
                deadline = excluded.deadline,
                status = excluded.status,
                fit_score = excluded.fit_score,
                project_code = excluded.project_code,
                contact_id = excluded.contact_id",
            params![
                grant.id,
                grant.name,
                grant.funder,
                grant.description,
                grant.amount_min,
                grant.amount_max,
                grant.deadline,
                grant.status,
                grant.fit_score,
                grant.project_code,
                grant.contact_id,
            ],
        )?;
        Ok(())
    }

    /// Open grants whose deadline is undated or falls in `[today, horizon]`.
    pub fn get_open_grants(
        &self,
        today: &str,
        horizon: &str,
        limit: usize,
    ) -> Result<Vec<DbGrant>, DbError> {
        let sql = format!(
            "SELECT id, name, funder, description, amount_min, amount_max, deadline, status,
                    fit_score, project_code, contact_id
             FROM grant_opportunities
             WHERE status NOT IN ({CLOSED_GRANT_STATUSES})
               AND (deadline IS NULL OR (deadline >= ?1 AND deadline <= ?2))
             ORDER BY fit_score IS NULL, fit_score DESC, deadline IS NULL, deadline ASC, id ASC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![today, horizon, limit as i64], |row| {
            Ok(DbGrant {
                id: row.get(0)?,
                name: row.get(1)?,
                funder: row.get(2)?,
                description: row.get(3)?,
                amount_min: row.get(4)?,
                amount_max: row.get(5)?,
                deadline: row.get(6)?,
                status: row.get(7)?,
                fit_score: row.get(8)?,
                project_code: row.get(9)?,
                contact_id: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Service deals
    // =========================================================================

    pub fn upsert_service_deal(&self, deal: &DbServiceDeal) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO service_deals (id, name, contact_id, value, stage, expected_close,
                                        project_code, fit_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                contact_id = excluded.contact_id,
                value = excluded.value,
                stage = excluded.stage,
                expected_close = excluded.expected_close,
                project_code = excluded.project_code,
                fit_score = excluded.fit_score",
            params![
                deal.id,
                deal.name,
                deal.contact_id,
                deal.value,
                deal.stage,
                deal.expected_close,
                deal.project_code,
                deal.fit_score,
            ],
        )?;
        Ok(())
    }

    pub fn get_open_service_deals(&self, limit: usize) -> Result<Vec<DbServiceDeal>, DbError> {
        let sql = format!(
            "SELECT id, name, contact_id, value, stage, expected_close, project_code, fit_score
             FROM service_deals
             WHERE stage NOT IN ({CLOSED_DEAL_STAGES})
             ORDER BY fit_score IS NULL, fit_score DESC, expected_close IS NULL,
                      expected_close ASC, id ASC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(DbServiceDeal {
                id: row.get(0)?,
                name: row.get(1)?,
                contact_id: row.get(2)?,
                value: row.get(3)?,
                stage: row.get(4)?,
                expected_close: row.get(5)?,
                project_code: row.get(6)?,
                fit_score: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Fundraising
    // =========================================================================

    pub fn upsert_fundraising_prospect(&self, prospect: &DbFundraisingProspect) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO fundraising_pipeline (id, donor_name, contact_id, ask_amount, stage,
                                               next_step_date, project_code, fit_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                donor_name = excluded.donor_name,
                contact_id = excluded.contact_id,
                ask_amount = excluded.ask_amount,
                stage = excluded.stage,
                next_step_date = excluded.next_step_date,
                project_code = excluded.project_code,
                fit_score = excluded.fit_score",
            params![
                prospect.id,
                prospect.donor_name,
                prospect.contact_id,
                prospect.ask_amount,
                prospect.stage,
                prospect.next_step_date,
                prospect.project_code,
                prospect.fit_score,
            ],
        )?;
        Ok(())
    }

    pub fn get_open_fundraising(&self, limit: usize) -> Result<Vec<DbFundraisingProspect>, DbError> {
        let sql = format!(
            "SELECT id, donor_name, contact_id, ask_amount, stage, next_step_date, project_code,
                    fit_score
             FROM fundraising_pipeline
             WHERE stage NOT IN ({CLOSED_FUNDRAISING_STAGES})
             ORDER BY fit_score IS NULL, fit_score DESC, next_step_date IS NULL,
                      next_step_date ASC, id ASC
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(DbFundraisingProspect {
                id: row.get(0)?,
                donor_name: row.get(1)?,
                contact_id: row.get(2)?,
                ask_amount: row.get(3)?,
                stage: row.get(4)?,
                next_step_date: row.get(5)?,
                project_code: row.get(6)?,
                fit_score: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Open deal value per contact, for the pipeline-totals join.
    pub fn list_pipeline_totals(&self, contact_ids: &[String]) -> Result<Vec<DbPipelineTotal>, DbError> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT contact_id, COALESCE(SUM(value), 0.0), COUNT(*)
             FROM service_deals
             WHERE contact_id IN ({})
               AND stage NOT IN ({CLOSED_DEAL_STAGES})
             GROUP BY contact_id
             ORDER BY contact_id ASC",
            in_placeholders(contact_ids.len(), 0)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = contact_ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();

        let rows = stmt.query_map(&*params, |row| {
            Ok(DbPipelineTotal {
                contact_id: row.get(0)?,
                sum_value: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::test_db;
    use crate::db::{DbFundraisingProspect, DbGrant, DbServiceDeal};

    fn grant(id: &str, deadline: Option<&str>, status: &str, fit: Option<f64>) -> DbGrant {
        DbGrant {
            id: id.to_string(),
            name: Some(format!("Grant {id}")),
            funder: Some("Community Foundation".to_string()),
            description: None,
            amount_min: Some(5_000.0),
            amount_max: Some(20_000.0),
            deadline: deadline.map(ToString::to_string),
            status: status.to_string(),
            fit_score: fit,
            project_code: None,
            contact_id: None,
        }
    }

    fn deal(id: &str, contact: &str, value: f64, stage: &str) -> DbServiceDeal {
        DbServiceDeal {
            id: id.to_string(),
            name: Some(format!("Deal {id}")),
            contact_id: Some(contact.to_string()),
            value: Some(value),
            stage: stage.to_string(),
            expected_close: None,
            project_code: None,
            fit_score: None,
        }
    }

    #[test]
    fn open_grants_skip_closed_and_out_of_window() {
        let (db, _) = test_db();
        db.upsert_grant(&grant("g1", Some("2026-11-01"), "researching", Some(7.0))).unwrap();
        db.upsert_grant(&grant("g2", Some("2026-10-01"), "researching", None)).unwrap();
        db.upsert_grant(&grant("g3", Some("2026-11-01"), "awarded", None)).unwrap();
        db.upsert_grant(&grant("g4", None, "drafting", None)).unwrap();
        db.upsert_grant(&grant("g5", Some("2027-12-01"), "researching", None)).unwrap();

        let rows = db.get_open_grants("2026-10-16", "2027-04-14", 10).unwrap();
        let ids: Vec<&str> = rows.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g4"]);
    }

    #[test]
    fn closed_deals_and_donations_are_excluded() {
        let (db, _) = test_db();
        db.upsert_service_deal(&deal("s1", "c1", 1_000.0, "proposal")).unwrap();
        db.upsert_service_deal(&deal("s2", "c1", 2_000.0, "won")).unwrap();
        db.upsert_fundraising_prospect(&DbFundraisingProspect {
            id: "f1".to_string(),
            donor_name: Some("Donor".to_string()),
            contact_id: None,
            ask_amount: Some(500.0),
            stage: "received".to_string(),
            next_step_date: None,
            project_code: None,
            fit_score: None,
        })
        .unwrap();

        let deals = db.get_open_service_deals(10).unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].id, "s1");
        assert!(db.get_open_fundraising(10).unwrap().is_empty());
    }

    #[test]
    fn pipeline_totals_sum_open_deals_per_contact() {
        let (db, _) = test_db();
        db.upsert_service_deal(&deal("s1", "c1", 1_000.0, "proposal")).unwrap();
        db.upsert_service_deal(&deal("s2", "c1", 2_500.0, "lead")).unwrap();
        db.upsert_service_deal(&deal("s3", "c1", 9_000.0, "lost")).unwrap();
        db.upsert_service_deal(&deal("s4", "c2", 400.0, "lead")).unwrap();

        let totals = db
            .list_pipeline_totals(&["c1".to_string(), "c3".to_string()])
            .unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].contact_id, "c1");
        assert_eq!(totals[0].sum_value, 3_500.0);
        assert_eq!(totals[0].count, 2);
    }
}
