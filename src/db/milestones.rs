use rusqlite::params;

use super::*;

impl OpsDb {
    // =========================================================================
    // Milestones (project deadlines)
    // =========================================================================

    pub fn upsert_milestone(&self, milestone: &DbMilestone) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO milestones (id, title, project_code, due_date, importance, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                project_code = excluded.project_code,
                due_date = excluded.due_date,
                importance = excluded.importance,
                status = excluded.status",
            params![
                milestone.id,
                milestone.title,
                milestone.project_code,
                milestone.due_date,
                milestone.importance,
                milestone.status,
            ],
        )?;
        Ok(())
    }

    /// Open milestones due between `from` and `until`, both inclusive, soonest first.
    pub fn get_upcoming_milestones(
        &self,
        from: &str,
        until: &str,
        limit: usize,
    ) -> Result<Vec<DbMilestone>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, project_code, due_date, importance, status
             FROM milestones
             WHERE status = 'open'
               AND due_date IS NOT NULL
               AND due_date >= ?1
               AND due_date <= ?2
             ORDER BY due_date ASC, id ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![from, until, limit as i64], |row| {
            Ok(DbMilestone {
                id: row.get(0)?,
                title: row.get(1)?,
                project_code: row.get(2)?,
                due_date: row.get(3)?,
                importance: row.get(4)?,
                status: row.get(5)?,
            })
        })?;

        let mut milestones = Vec::new();
        for row in rows {
            milestones.push(row?);
        }
        Ok(milestones)
    }
}
