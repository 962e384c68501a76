use rusqlite::params;

use super::*;

impl OpsDb {
    // =========================================================================
    // Actions
    // =========================================================================

    /// Insert or replace an action row.
    pub fn upsert_action(&self, action: &DbAction) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO actions (id, title, project_code, status, action_required,
                                  follow_up_date, importance, contact_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                project_code = excluded.project_code,
                status = excluded.status,
                action_required = excluded.action_required,
                follow_up_date = excluded.follow_up_date,
                importance = excluded.importance,
                contact_id = excluded.contact_id",
            params![
                action.id,
                action.title,
                action.project_code,
                action.status,
                action.action_required as i32,
                action.follow_up_date,
                action.importance,
                action.contact_id,
            ],
        )?;
        Ok(())
    }

    /// Open actions that still need doing and whose follow-up date is before `today`.
    ///
    /// Oldest follow-up first so the cap keeps the most overdue rows.
    pub fn get_overdue_actions(&self, today: &str, limit: usize) -> Result<Vec<DbAction>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, project_code, status, action_required, follow_up_date,
                    importance, contact_id
             FROM actions
             WHERE status = 'open'
               AND action_required = 1
               AND follow_up_date IS NOT NULL
               AND follow_up_date < ?1
             ORDER BY follow_up_date ASC, id ASC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![today, limit as i64], map_action_row)?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row?);
        }
        Ok(actions)
    }
}

fn map_action_row(row: &rusqlite::Row) -> rusqlite::Result<DbAction> {
    Ok(DbAction {
        id: row.get(0)?,
        title: row.get(1)?,
        project_code: row.get(2)?,
        status: row.get(3)?,
        action_required: row.get::<_, i32>(4)? != 0,
        follow_up_date: row.get(5)?,
        importance: row.get(6)?,
        contact_id: row.get(7)?,
    })
}
