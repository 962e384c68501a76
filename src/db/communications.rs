use rusqlite::params;

use super::*;

impl OpsDb {
    // =========================================================================
    // Communications log
    // =========================================================================

    /// Insert or replace a communication row. `occurred_at` is UTC, either
    /// RFC 3339 or `YYYY-MM-DD HH:MM:SS`.
    pub fn upsert_communication(&self, comm: &DbCommunication) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO communications (id, contact_id, contact_name, contact_email, subject,
                                         direction, requires_response, responded_at,
                                         occurred_at, project_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                contact_id = excluded.contact_id,
                contact_name = excluded.contact_name,
                contact_email = excluded.contact_email,
                subject = excluded.subject,
                direction = excluded.direction,
                requires_response = excluded.requires_response,
                responded_at = excluded.responded_at,
                occurred_at = excluded.occurred_at,
                project_code = excluded.project_code",
            params![
                comm.id,
                comm.contact_id,
                comm.contact_name,
                comm.contact_email,
                comm.subject,
                comm.direction,
                comm.requires_response as i32,
                comm.responded_at,
                comm.occurred_at,
                comm.project_code,
            ],
        )?;
        Ok(())
    }

    /// Inbound messages awaiting a response that arrived at or after `since`.
    ///
    /// Oldest first: the longest-waiting messages survive the cap.
    pub fn get_unanswered_communications(
        &self,
        since: &str,
        limit: usize,
    ) -> Result<Vec<DbCommunication>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contact_id, contact_name, contact_email, subject, direction,
                    requires_response, responded_at, occurred_at, project_code
             FROM communications
             WHERE direction = 'inbound'
               AND requires_response = 1
               AND responded_at IS NULL
               AND datetime(occurred_at) >= datetime(?1)
             ORDER BY datetime(occurred_at) ASC, id ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![since, limit as i64], map_communication_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Batch-query communication headers for a set of contacts.
    ///
    /// Ordered by contact, newest first, so the first row seen per contact is
    /// its latest communication.
    pub fn list_communications_for_contacts(
        &self,
        contact_ids: &[String],
    ) -> Result<Vec<DbLastCommunication>, DbError> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT contact_id, subject, occurred_at
             FROM communications
             WHERE contact_id IN ({})
             ORDER BY contact_id ASC, occurred_at DESC, id DESC",
            in_placeholders(contact_ids.len(), 0)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = contact_ids
            .iter()
            .map(|id| id as &dyn rusqlite::types::ToSql)
            .collect();

        let rows = stmt.query_map(&*params, |row| {
            Ok(DbLastCommunication {
                contact_id: row.get(0)?,
                subject: row.get(1)?,
                occurred_at: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

/// Row mapper for communications SELECT queries (10 columns).
fn map_communication_row(row: &rusqlite::Row) -> rusqlite::Result<DbCommunication> {
    Ok(DbCommunication {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        contact_name: row.get(2)?,
        contact_email: row.get(3)?,
        subject: row.get(4)?,
        direction: row.get(5)?,
        requires_response: row.get::<_, i32>(6)? != 0,
        responded_at: row.get(7)?,
        occurred_at: row.get(8)?,
        project_code: row.get(9)?,
    })
}
