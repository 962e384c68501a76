use rusqlite::params;

use super::*;

impl OpsDb {
    // =========================================================================
    // Contacts and relationship health
    // =========================================================================

    pub fn upsert_contact(&self, contact: &DbContact) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO contacts (id, full_name, email, company_name, last_contact_date,
                                   engagement_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                email = excluded.email,
                company_name = excluded.company_name,
                last_contact_date = excluded.last_contact_date,
                engagement_status = excluded.engagement_status",
            params![
                contact.id,
                contact.full_name,
                contact.email,
                contact.company_name,
                contact.last_contact_date,
                contact.engagement_status,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_relationship_health(&self, health: &DbRelationshipHealth) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO relationship_health (contact_id, temperature, last_contact_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(contact_id) DO UPDATE SET
                temperature = excluded.temperature,
                last_contact_at = excluded.last_contact_at",
            params![health.contact_id, health.temperature, health.last_contact_at],
        )?;
        Ok(())
    }

    /// Active or prospective contacts last heard from on or after `floor`
    /// and before `threshold` (both `YYYY-MM-DD`).
    ///
    /// Least recently contacted first.
    pub fn get_stale_contacts(
        &self,
        floor: &str,
        threshold: &str,
        limit: usize,
    ) -> Result<Vec<DbContact>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, full_name, email, company_name, last_contact_date, engagement_status
             FROM contacts
             WHERE engagement_status IN ('active', 'prospect')
               AND last_contact_date IS NOT NULL
               AND date(last_contact_date) >= ?1
               AND date(last_contact_date) < ?2
             ORDER BY datetime(last_contact_date) ASC, id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![floor, threshold, limit as i64], |row| {
            Ok(DbContact {
                id: row.get(0)?,
                full_name: row.get(1)?,
                email: row.get(2)?,
                company_name: row.get(3)?,
                last_contact_date: row.get(4)?,
                engagement_status: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Batch-query relationship health rows for a set of contacts.
    pub fn list_relationship_health(
        &self,
        contact_ids: &[String],
    ) -> Result<Vec<DbRelationshipHealth>, DbError> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT contact_id, temperature, last_contact_at
             FROM relationship_health
             WHERE contact_id IN ({})
             ORDER BY contact_id ASC",
            in_placeholders(contact_ids.len(), 0)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = contact_ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();

        let rows = stmt.query_map(&*params, |row| {
            Ok(DbRelationshipHealth {
                contact_id: row.get(0)?,
                temperature: row.get(1)?,
                last_contact_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
