//! SQLite-backed operations store: actions, communications, contacts,
//! milestones and the three opportunity pipelines.
//!
//! The signal engine only reads from here. Every collector and joiner opens
//! its own read-only connection, so no connection is shared across threads
//! or requests. Writers (seeding, imports, tests) use [`OpsDb::open_at`].

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

mod actions;
mod communications;
mod contacts;
mod milestones;
mod pipeline;
pub mod types;

pub use types::*;

pub struct OpsDb {
    conn: Connection,
}

impl OpsDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `path` and apply the schema.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets read-only collectors run while a writer holds the file.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Open a database at an explicit path in read-only mode.
    pub fn open_readonly_at(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.opsdesk/opsdesk.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".opsdesk").join("opsdesk.db"))
    }
}
